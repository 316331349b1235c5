//! Priority scoring and ordering ranks.
//!
//! Each report type has one declarative [`PriorityTable`]. The same table
//! produces the in-process score and the SQL expression embedded in
//! `find_by_priority`, so the two cannot drift apart.
//!
//! Road: urgency + damage level + traffic impact + damaged area + severe bridge.
//! Water: urgent category + damage level + affected rice field + affected farmers.

use crate::domain::enums::DamageLevel;
use crate::domain::road::RoadReport;
use crate::domain::water::WaterReport;

/// One additive component of a score.
pub enum Component<R> {
    /// Points by categorical token; tokens not listed score zero.
    Category {
        column: &'static str,
        value: fn(&R) -> Option<&'static str>,
        bands: &'static [(&'static str, i32)],
    },
    /// First step whose threshold the value strictly exceeds. Steps are
    /// listed from the highest threshold down.
    Above {
        sql: &'static str,
        value: fn(&R) -> f64,
        steps: &'static [(f64, i32)],
    },
    /// Fixed points when a condition holds.
    When {
        sql: &'static str,
        test: fn(&R) -> bool,
        points: i32,
    },
}

impl<R> Component<R> {
    fn score(&self, record: &R) -> i32 {
        match self {
            Component::Category { value, bands, .. } => value(record)
                .and_then(|token| bands.iter().find(|(t, _)| *t == token))
                .map(|(_, points)| *points)
                .unwrap_or(0),
            Component::Above { value, steps, .. } => {
                let v = value(record);
                steps
                    .iter()
                    .find(|(threshold, _)| v > *threshold)
                    .map(|(_, points)| *points)
                    .unwrap_or(0)
            }
            Component::When { test, points, .. } => {
                if test(record) {
                    *points
                } else {
                    0
                }
            }
        }
    }

    fn sql(&self, alias: &str) -> String {
        let qualify = |expr: &str| expr.replace("{t}", alias);
        match self {
            Component::Category { column, bands, .. } => {
                let arms: String = bands
                    .iter()
                    .map(|(token, points)| format!(" WHEN '{token}' THEN {points}"))
                    .collect();
                format!("(CASE {alias}.{column}{arms} ELSE 0 END)")
            }
            Component::Above { sql, steps, .. } => {
                let value = qualify(sql);
                let arms: String = steps
                    .iter()
                    .map(|(threshold, points)| {
                        format!(" WHEN {value} > {threshold:?} THEN {points}")
                    })
                    .collect();
                format!("(CASE{arms} ELSE 0 END)")
            }
            Component::When { sql, points, .. } => {
                format!("(CASE WHEN {} THEN {points} ELSE 0 END)", qualify(sql))
            }
        }
    }
}

pub struct PriorityTable<R: 'static> {
    pub components: &'static [Component<R>],
}

impl<R: 'static> PriorityTable<R> {
    /// Score a record. Never fails; unknown bands contribute nothing.
    pub fn score(&self, record: &R) -> i32 {
        self.components.iter().map(|c| c.score(record)).sum()
    }

    /// SQL expression computing the same score over rows aliased `alias`.
    pub fn sql_expr(&self, alias: &str) -> String {
        let parts: Vec<String> = self.components.iter().map(|c| c.sql(alias)).collect();
        format!("({})", parts.join(" + "))
    }
}

// ---------------------------------------------------------------------------
// Road
// ---------------------------------------------------------------------------

fn road_urgency(r: &RoadReport) -> Option<&'static str> {
    Some(r.urgency_level.as_str())
}

fn road_damage(r: &RoadReport) -> Option<&'static str> {
    Some(r.damage_level.as_str())
}

fn road_traffic(r: &RoadReport) -> Option<&'static str> {
    Some(r.traffic_impact.as_str())
}

fn road_area(r: &RoadReport) -> f64 {
    r.effective_damaged_area()
}

fn road_severe_bridge(r: &RoadReport) -> bool {
    r.has_bridge() && r.bridge_damage_level == Some(DamageLevel::Severe)
}

pub static ROAD_PRIORITY: PriorityTable<RoadReport> = PriorityTable {
    components: &[
        Component::Category {
            column: "urgency_level",
            value: road_urgency,
            bands: &[("EMERGENCY", 100), ("HIGH", 75), ("MEDIUM", 50), ("LOW", 25)],
        },
        Component::Category {
            column: "damage_level",
            value: road_damage,
            bands: &[("SEVERE", 50), ("MODERATE", 30), ("MINOR", 15)],
        },
        Component::Category {
            column: "traffic_impact",
            value: road_traffic,
            bands: &[
                ("BLOCKED", 60),
                ("SEVERELY_REDUCED", 40),
                ("REDUCED", 20),
                ("MINIMAL", 5),
            ],
        },
        Component::Above {
            sql: "(CASE WHEN {t}.total_damaged_area > 0 \
                  THEN {t}.total_damaged_area ELSE {t}.damaged_area END)",
            value: road_area,
            steps: &[(100.0, 25), (50.0, 15)],
        },
        Component::When {
            sql: "(btrim(COALESCE({t}.bridge_name, ''), E' \\t\\r\\n') <> '' \
                  AND {t}.bridge_damage_level IS NOT DISTINCT FROM 'SEVERE')",
            test: road_severe_bridge,
            points: 30,
        },
    ],
};

// ---------------------------------------------------------------------------
// Water
// ---------------------------------------------------------------------------

fn water_urgency(r: &WaterReport) -> Option<&'static str> {
    Some(r.urgency_category.as_str())
}

fn water_damage(r: &WaterReport) -> Option<&'static str> {
    Some(r.damage_level.as_str())
}

fn water_rice_field(r: &WaterReport) -> f64 {
    r.affected_rice_field_area_ha
}

fn water_farmers(r: &WaterReport) -> f64 {
    f64::from(r.affected_farmers_count)
}

pub static WATER_PRIORITY: PriorityTable<WaterReport> = PriorityTable {
    components: &[
        Component::Category {
            column: "urgency_category",
            value: water_urgency,
            bands: &[("URGENT", 100)],
        },
        Component::Category {
            column: "damage_level",
            value: water_damage,
            bands: &[("SEVERE", 50), ("MODERATE", 25), ("MINOR", 10)],
        },
        Component::Above {
            sql: "{t}.affected_rice_field_area_ha",
            value: water_rice_field,
            steps: &[(10.0, 30)],
        },
        Component::Above {
            sql: "{t}.affected_farmers_count",
            value: water_farmers,
            steps: &[(50.0, 20)],
        },
    ],
};

/// Records that carry a priority score.
pub trait Prioritized {
    fn priority_score(&self) -> i32;
}

impl Prioritized for RoadReport {
    fn priority_score(&self) -> i32 {
        ROAD_PRIORITY.score(self)
    }
}

impl Prioritized for WaterReport {
    fn priority_score(&self) -> i32 {
        WATER_PRIORITY.score(self)
    }
}

// ---------------------------------------------------------------------------
// Ordering ranks
// ---------------------------------------------------------------------------

/// Rank assigned to tokens a table does not list.
pub const UNKNOWN_RANK: i32 = 99;

/// Maps an ordered enumeration to integers; lower ranks sort first.
pub struct RankTable {
    pub column: &'static str,
    pub ranks: &'static [(&'static str, i32)],
}

impl RankTable {
    pub fn rank(&self, token: &str) -> i32 {
        self.ranks
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, rank)| *rank)
            .unwrap_or(UNKNOWN_RANK)
    }

    pub fn sql(&self) -> String {
        let arms: String = self
            .ranks
            .iter()
            .map(|(token, rank)| format!(" WHEN '{token}' THEN {rank}"))
            .collect();
        format!("(CASE {}{arms} ELSE {UNKNOWN_RANK} END)", self.column)
    }
}

pub const URGENCY_RANK: RankTable = RankTable {
    column: "urgency_level",
    ranks: &[("EMERGENCY", 0), ("HIGH", 1), ("MEDIUM", 2), ("LOW", 3)],
};

pub const TRAFFIC_IMPACT_RANK: RankTable = RankTable {
    column: "traffic_impact",
    ranks: &[("BLOCKED", 0), ("SEVERELY_REDUCED", 1), ("REDUCED", 2), ("MINIMAL", 3)],
};

pub const URGENCY_CATEGORY_RANK: RankTable = RankTable {
    column: "urgency_category",
    ranks: &[("URGENT", 0), ("PRIORITY", 1), ("ROUTINE", 2)],
};

pub const DAMAGE_LEVEL_RANK: RankTable = RankTable {
    column: "damage_level",
    ranks: &[("SEVERE", 0), ("MODERATE", 1), ("MINOR", 2)],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::enums::UrgencyCategory;
    use crate::domain::road::tests::sample_road;
    use crate::domain::water::tests::sample_water;

    #[test]
    fn road_without_bridge_scores_225() {
        let mut road = sample_road();
        road.apply_derivations();
        assert_eq!(road.damaged_area, 60.0);
        assert_eq!(road.priority_score(), 100 + 50 + 60 + 15);
    }

    #[test]
    fn severe_bridge_adds_30() {
        let mut road = sample_road();
        road.bridge_name = Some("Bengawan".into());
        road.bridge_damage_level = Some(DamageLevel::Severe);
        road.apply_derivations();
        assert_eq!(road.priority_score(), 255);

        road.bridge_damage_level = Some(DamageLevel::Moderate);
        assert_eq!(road.priority_score(), 225);
    }

    #[test]
    fn area_steps_are_strict() {
        let mut road = sample_road();
        road.damaged_area = 100.0;
        road.total_damaged_area = 0.0;
        assert_eq!(ROAD_PRIORITY.components[3].score(&road), 15);
        road.total_damaged_area = 100.5;
        assert_eq!(ROAD_PRIORITY.components[3].score(&road), 25);
        road.total_damaged_area = 0.0;
        road.damaged_area = 50.0;
        assert_eq!(ROAD_PRIORITY.components[3].score(&road), 0);
    }

    #[test]
    fn water_scores() {
        let a = sample_water();
        assert_eq!(a.priority_score(), 200);

        let mut b = sample_water();
        b.urgency_category = UrgencyCategory::Routine;
        b.damage_level = DamageLevel::Minor;
        b.affected_rice_field_area_ha = 2.0;
        b.affected_farmers_count = 5;
        assert_eq!(b.priority_score(), 10);
    }

    #[test]
    fn sql_expression_lists_every_band() {
        let sql = ROAD_PRIORITY.sql_expr("r");
        assert!(sql.contains("CASE r.urgency_level WHEN 'EMERGENCY' THEN 100"));
        assert!(sql.contains("WHEN 'MINIMAL' THEN 5"));
        assert!(sql.contains("r.total_damaged_area > 0 THEN r.total_damaged_area"));
        assert!(sql.contains("> 100.0 THEN 25"));
        assert!(!sql.contains("{t}"));

        let sql = WATER_PRIORITY.sql_expr("w");
        assert!(sql.contains("WHEN w.affected_farmers_count > 50.0 THEN 20"));
    }

    #[test]
    fn rank_tables() {
        assert_eq!(URGENCY_RANK.rank("EMERGENCY"), 0);
        assert_eq!(DAMAGE_LEVEL_RANK.rank("MINOR"), 2);
        assert_eq!(TRAFFIC_IMPACT_RANK.rank("GRIDLOCK"), UNKNOWN_RANK);
        assert_eq!(
            URGENCY_CATEGORY_RANK.sql(),
            "(CASE urgency_category WHEN 'URGENT' THEN 0 WHEN 'PRIORITY' THEN 1 \
             WHEN 'ROUTINE' THEN 2 ELSE 99 END)"
        );
    }
}

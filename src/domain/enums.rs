//! Categorical fields.
//!
//! Each enumeration is a closed set of upper snake case tokens. The token is
//! what gets serialized, bound as a query parameter and stored verbatim in a
//! `TEXT` column; anything outside the set fails to parse.

use thiserror::Error;

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {kind} token '{value}'")]
pub struct TokenError {
    pub kind: &'static str,
    pub value: String,
}

impl From<TokenError> for CoreError {
    fn from(err: TokenError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

macro_rules! token_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $token:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// The stored token.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $token ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = TokenError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $token => Ok($name::$variant), )+
                    other => Err(TokenError {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let token = String::deserialize(deserializer)?;
                token.parse().map_err(serde::de::Error::custom)
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let token = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(token.parse()?)
            }
        }
    };
}

pub(crate) use token_enum;

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

token_enum! {
    /// Urgency of a road or spatial report.
    UrgencyLevel {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Emergency => "EMERGENCY",
    }
}

token_enum! {
    /// Physical damage severity (road surface, bridge, water structure).
    DamageLevel {
        Minor => "MINOR",
        Moderate => "MODERATE",
        Severe => "SEVERE",
    }
}

// ---------------------------------------------------------------------------
// Roads and bridges
// ---------------------------------------------------------------------------

token_enum! {
    RoadType {
        National => "NATIONAL",
        Provincial => "PROVINCIAL",
        Regency => "REGENCY",
        City => "CITY",
        Village => "VILLAGE",
    }
}

token_enum! {
    PavementType {
        Asphalt => "ASPHALT",
        Concrete => "CONCRETE",
        PavingBlock => "PAVING_BLOCK",
        Gravel => "GRAVEL",
        Dirt => "DIRT",
    }
}

token_enum! {
    RoadDamageType {
        Pothole => "POTHOLE",
        Crack => "CRACK",
        Rutting => "RUTTING",
        Subsidence => "SUBSIDENCE",
        Erosion => "EROSION",
        Landslide => "LANDSLIDE",
        Flooding => "FLOODING",
        BridgeDamage => "BRIDGE_DAMAGE",
        Other => "OTHER",
    }
}

token_enum! {
    BridgeType {
        Concrete => "CONCRETE",
        Steel => "STEEL",
        Wood => "WOOD",
        Suspension => "SUSPENSION",
        Culvert => "CULVERT",
    }
}

token_enum! {
    TrafficCondition {
        Normal => "NORMAL",
        Congested => "CONGESTED",
        Detoured => "DETOURED",
        Closed => "CLOSED",
    }
}

token_enum! {
    TrafficImpact {
        Minimal => "MINIMAL",
        Reduced => "REDUCED",
        SeverelyReduced => "SEVERELY_REDUCED",
        Blocked => "BLOCKED",
    }
}

// ---------------------------------------------------------------------------
// Water resources
// ---------------------------------------------------------------------------

token_enum! {
    InstitutionUnit {
        Bbws => "BBWS",
        Bws => "BWS",
        DinasPsdaProvinsi => "DINAS_PSDA_PROVINSI",
        UptPsda => "UPT_PSDA",
        DinasPuKabupaten => "DINAS_PU_KABUPATEN",
    }
}

token_enum! {
    IrrigationType {
        PrimaryChannel => "PRIMARY_CHANNEL",
        SecondaryChannel => "SECONDARY_CHANNEL",
        TertiaryChannel => "TERTIARY_CHANNEL",
        Weir => "WEIR",
        Dam => "DAM",
        Intake => "INTAKE",
        DrainageChannel => "DRAINAGE_CHANNEL",
        RetentionPond => "RETENTION_POND",
    }
}

token_enum! {
    WaterDamageType {
        Leakage => "LEAKAGE",
        Sedimentation => "SEDIMENTATION",
        Collapse => "COLLAPSE",
        Crack => "CRACK",
        Blockage => "BLOCKAGE",
        Erosion => "EROSION",
        GateFailure => "GATE_FAILURE",
        Other => "OTHER",
    }
}

token_enum! {
    UrgencyCategory {
        Routine => "ROUTINE",
        Priority => "PRIORITY",
        Urgent => "URGENT",
    }
}

// ---------------------------------------------------------------------------
// Agriculture
// ---------------------------------------------------------------------------

token_enum! {
    FarmerGroupType {
        Poktan => "POKTAN",
        Gapoktan => "GAPOKTAN",
        Kwt => "KWT",
        Individual => "INDIVIDUAL",
    }
}

token_enum! {
    /// Which of the three commodity blocks a value belongs to.
    CommodityType {
        Pangan => "PANGAN",
        Hortikultura => "HORTIKULTURA",
        Perkebunan => "PERKEBUNAN",
    }
}

token_enum! {
    LandStatus {
        Owned => "OWNED",
        Rented => "RENTED",
        Sharecropped => "SHARECROPPED",
        StateLand => "STATE_LAND",
    }
}

token_enum! {
    GrowthPhase {
        LandPreparation => "LAND_PREPARATION",
        Seedling => "SEEDLING",
        Vegetative => "VEGETATIVE",
        Generative => "GENERATIVE",
        Harvest => "HARVEST",
        PostHarvest => "POST_HARVEST",
    }
}

token_enum! {
    PestType {
        Planthopper => "PLANTHOPPER",
        Rat => "RAT",
        Caterpillar => "CATERPILLAR",
        StemBorer => "STEM_BORER",
        BlastDisease => "BLAST_DISEASE",
        Other => "OTHER",
    }
}

token_enum! {
    AffectedAreaLevel {
        Light => "LIGHT",
        Moderate => "MODERATE",
        Heavy => "HEAVY",
        TotalLoss => "TOTAL_LOSS",
    }
}

token_enum! {
    Weather {
        Sunny => "SUNNY",
        Cloudy => "CLOUDY",
        Rainy => "RAINY",
        HeavyRain => "HEAVY_RAIN",
        Drought => "DROUGHT",
    }
}

token_enum! {
    MainConstraint {
        WaterShortage => "WATER_SHORTAGE",
        PestDisease => "PEST_DISEASE",
        FertilizerShortage => "FERTILIZER_SHORTAGE",
        SeedQuality => "SEED_QUALITY",
        LaborShortage => "LABOR_SHORTAGE",
        Capital => "CAPITAL",
        MarketPrice => "MARKET_PRICE",
        None => "NONE",
    }
}

token_enum! {
    FarmerHope {
        FertilizerSubsidy => "FERTILIZER_SUBSIDY",
        SeedAssistance => "SEED_ASSISTANCE",
        IrrigationRepair => "IRRIGATION_REPAIR",
        EquipmentAssistance => "EQUIPMENT_ASSISTANCE",
        Training => "TRAINING",
        PriceGuarantee => "PRICE_GUARANTEE",
        CapitalAccess => "CAPITAL_ACCESS",
    }
}

token_enum! {
    TrainingNeed {
        CultivationTechnique => "CULTIVATION_TECHNIQUE",
        PestManagement => "PEST_MANAGEMENT",
        PostHarvest => "POST_HARVEST",
        OrganicFarming => "ORGANIC_FARMING",
        FarmManagement => "FARM_MANAGEMENT",
        DigitalMarketing => "DIGITAL_MARKETING",
        None => "NONE",
    }
}

token_enum! {
    UrgentNeed {
        Fertilizer => "FERTILIZER",
        Seeds => "SEEDS",
        Pesticide => "PESTICIDE",
        WaterPump => "WATER_PUMP",
        Tractor => "TRACTOR",
        Harvester => "HARVESTER",
        None => "NONE",
    }
}

token_enum! {
    WaterAccess {
        Adequate => "ADEQUATE",
        Limited => "LIMITED",
        VeryLimited => "VERY_LIMITED",
        None => "NONE",
    }
}

// ---------------------------------------------------------------------------
// Spatial planning
// ---------------------------------------------------------------------------

token_enum! {
    SpatialInstitution {
        DinasTataRuang => "DINAS_TATA_RUANG",
        Bappeda => "BAPPEDA",
        SatpolPp => "SATPOL_PP",
        DinasPupr => "DINAS_PUPR",
        DinasLingkunganHidup => "DINAS_LINGKUNGAN_HIDUP",
    }
}

token_enum! {
    AreaCategory {
        ProtectedForest => "PROTECTED_FOREST",
        AgriculturalLand => "AGRICULTURAL_LAND",
        Residential => "RESIDENTIAL",
        Commercial => "COMMERCIAL",
        Industrial => "INDUSTRIAL",
        RiverBorder => "RIVER_BORDER",
        CoastalBorder => "COASTAL_BORDER",
        GreenOpenSpace => "GREEN_OPEN_SPACE",
    }
}

token_enum! {
    ViolationType {
        BuildingWithoutPermit => "BUILDING_WITHOUT_PERMIT",
        LandUseChange => "LAND_USE_CHANGE",
        BorderEncroachment => "BORDER_ENCROACHMENT",
        GreenSpaceConversion => "GREEN_SPACE_CONVERSION",
        IllegalMining => "ILLEGAL_MINING",
        ZoningViolation => "ZONING_VIOLATION",
    }
}

token_enum! {
    ViolationLevel {
        Light => "LIGHT",
        Moderate => "MODERATE",
        Heavy => "HEAVY",
    }
}

token_enum! {
    EnvironmentalImpact {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
    }
}

/// Validate a raw token for the enumeration `T`.
pub fn check_token<T>(value: &str) -> Result<(), TokenError>
where
    T: std::str::FromStr<Err = TokenError>,
{
    value.parse::<T>().map(|_| ())
}

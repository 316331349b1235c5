use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set. Store chatter stays at WARN.
fn default_directives(env: &Environment) -> &'static str {
    match env {
        Environment::Dev | Environment::Staging => {
            "building_report_backend=debug,sqlx=warn,redis=warn,info"
        }
        Environment::Prod => "building_report_backend=info,sqlx=warn,redis=warn,warn",
    }
}

/// Install the global tracing subscriber: JSON lines in prod, pretty output
/// elsewhere. A second call only warns.
pub fn init_logging(env: &Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(env)));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(env.is_dev())
        .with_line_number(env.is_dev());

    let installed = if env.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json().flatten_event(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.pretty())
            .try_init()
    };

    match installed {
        Ok(()) => tracing::info!(env = ?env, "Logging initialized"),
        Err(e) => tracing::warn!(error = %e, "Logging was already initialized"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        for env in [Environment::Dev, Environment::Staging, Environment::Prod] {
            assert!(EnvFilter::try_new(default_directives(&env)).is_ok());
        }
    }

    #[test]
    fn prod_is_quieter_than_dev() {
        assert!(default_directives(&Environment::Prod).contains("building_report_backend=info"));
        assert!(default_directives(&Environment::Dev).contains("building_report_backend=debug"));
    }
}

use thiserror::Error;

/// Startup configuration problems. Always fatal: no loop is started.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(
        "config validation failed ({} error{}):\n  - {}",
        .0.len(),
        plural(.0),
        .0.join("\n  - ")
    )]
    Invalid(Vec<String>),
}

fn plural(errors: &[String]) -> &'static str {
    if errors.len() == 1 {
        ""
    } else {
        "s"
    }
}

/// Reading store or status mirror failure. Logged by the caller; never
/// retried within the same cycle.
#[derive(Debug, Error)]
#[error("{op} failed: {source}")]
pub struct PersistenceError {
    pub op: &'static str,
    #[source]
    pub source: sqlx::Error,
}

impl PersistenceError {
    pub(crate) fn wrap(op: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self { op, source }
    }
}

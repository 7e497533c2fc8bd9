use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_expires_secs: i64,
    pub upload_dir: PathBuf,
    pub cors_origin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3001);

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        if jwt_secret.len() < 32 {
            return Err(crate::error::AppError::Config(
                "JWT_SECRET must be at least 32 bytes".into(),
            ));
        }
        // Default token lifetime: 7 days
        let jwt_expires_secs = env::var("JWT_EXPIRES_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7 * 24 * 3600);

        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));

        let cors_origin = env::var("CORS_ORIGIN").ok().filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            jwt_expires_secs,
            upload_dir,
            cors_origin,
        })
    }

    #[cfg(test)]
    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/test".into(),
            port: 3001,
            jwt_secret: "test-secret-test-secret-test-secret!".into(),
            jwt_expires_secs: 3600,
            upload_dir: PathBuf::from("uploads"),
            cors_origin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_the_startup_checks() {
        let config = Config::test_defaults();
        assert!(config.jwt_secret.len() >= 32);
        assert_eq!(config.port, 3001);
        assert!(config.cors_origin.is_none());
    }
}

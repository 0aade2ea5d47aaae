use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub app_name: String,
    pub currency: String,
    pub forecast_months: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: "./data/ledger.db".to_string(),
            app_name: "Previsor de Gastos".to_string(),
            currency: "R$".to_string(),
            forecast_months: 3,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists (development)
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let database_path = env::var("DATABASE_PATH").unwrap_or(defaults.database_path);
        let app_name = env::var("APP_NAME").unwrap_or(defaults.app_name);
        let currency = env::var("CURRENCY").unwrap_or(defaults.currency);

        let forecast_months = match env::var("FORECAST_MONTHS") {
            Ok(value) => parse_forecast_months(&value)?,
            Err(_) => defaults.forecast_months,
        };

        Ok(Config {
            database_path,
            app_name,
            currency,
            forecast_months,
        })
    }
}

fn parse_forecast_months(value: &str) -> Result<u32, String> {
    match value.trim().parse::<u32>() {
        Ok(months) if months > 0 => Ok(months),
        _ => Err(format!("Invalid FORECAST_MONTHS: {}", value)),
    }
}

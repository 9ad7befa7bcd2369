//! Configuration validation, run after YAML and environment are merged.

use tracing::warn;

use super::ServerConfig;
use crate::state::MAX_INSTRUCTIONS_SIZE;
use crate::utils::{validate_phone_number, validate_public_url};

/// Temperatures accepted by the realtime API.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.6..=1.2;

pub(super) fn validate_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_public_url_setting(&config.public_url)?;
    validate_agent(config)?;
    validate_twilio(config)?;
    validate_rate_limits(
        config.rate_limit_requests_per_second,
        config.rate_limit_burst_size,
    )?;

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; media streams will be rejected");
    }

    Ok(())
}

fn validate_public_url_setting(public_url: &Option<String>) -> Result<(), String> {
    if let Some(url) = public_url {
        validate_public_url(url).map_err(|e| format!("Invalid PUBLIC_URL '{url}': {e}"))?;
    }
    Ok(())
}

fn validate_agent(config: &ServerConfig) -> Result<(), String> {
    if !TEMPERATURE_RANGE.contains(&config.agent_temperature) {
        return Err(format!(
            "AGENT_TEMPERATURE must be between {} and {}, got {}",
            TEMPERATURE_RANGE.start(),
            TEMPERATURE_RANGE.end(),
            config.agent_temperature
        ));
    }
    if config.agent_instructions.len() > MAX_INSTRUCTIONS_SIZE {
        return Err(format!(
            "AGENT_INSTRUCTIONS exceeds maximum size of {MAX_INSTRUCTIONS_SIZE} bytes"
        ));
    }
    Ok(())
}

fn validate_twilio(config: &ServerConfig) -> Result<(), String> {
    if let Some(number) = &config.twilio_phone_number {
        validate_phone_number(number).map_err(|e| format!("Invalid TWILIO_PHONE_NUMBER: {e}"))?;
    }

    let set = [
        config.twilio_account_sid.is_some(),
        config.twilio_auth_token.is_some(),
        config.twilio_phone_number.is_some(),
    ];
    if set.iter().any(|s| *s) && !set.iter().all(|s| *s) {
        warn!(
            "Twilio is partially configured; set TWILIO_ACCOUNT_SID, TWILIO_AUTH_TOKEN and \
             TWILIO_PHONE_NUMBER to enable outbound calls"
        );
    }
    Ok(())
}

fn validate_rate_limits(requests_per_second: u32, burst_size: u32) -> Result<(), String> {
    if requests_per_second == 0 {
        return Err("RATE_LIMIT_REQUESTS_PER_SECOND must be greater than 0".to_string());
    }
    if burst_size == 0 {
        return Err("RATE_LIMIT_BURST_SIZE must be greater than 0".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_public_url_setting() {
        assert!(validate_public_url_setting(&None).is_ok());
        assert!(validate_public_url_setting(&Some("https://a.example.com".to_string())).is_ok());
        let err = validate_public_url_setting(&Some("mailto:x@y.z".to_string())).unwrap_err();
        assert!(err.contains("PUBLIC_URL"));
    }

    #[test]
    fn test_validate_rate_limits() {
        assert!(validate_rate_limits(60, 10).is_ok());
        assert!(validate_rate_limits(0, 10).is_err());
        assert!(validate_rate_limits(60, 0).is_err());
    }
}

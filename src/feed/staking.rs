//! HTTP validator source shaped like the staking REST endpoint. Token
//! balances arrive as micro-denom strings and are scaled to whole units here;
//! records that fail to parse degrade to zero weight and are dropped later by
//! the synthesizer's noise floor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::state::Config;
use crate::synth::RawEntity;

use super::ValidatorSource;

#[derive(Debug, Deserialize)]
struct ValidatorPageDto {
    #[serde(default)]
    validators: Vec<ValidatorDto>,
}

#[derive(Debug, Deserialize)]
struct ValidatorDto {
    operator_address: Option<String>,
    tokens: Option<String>,
    description: Option<DescriptionDto>,
}

#[derive(Debug, Deserialize, Default)]
struct DescriptionDto {
    moniker: Option<String>,
    details: Option<String>,
}

impl ValidatorDto {
    fn into_raw(self, index: usize, token_denom: f64) -> RawEntity {
        let weight = self
            .tokens
            .as_deref()
            .and_then(|t| t.parse::<f64>().ok())
            .unwrap_or(0.0)
            / token_denom;
        let description = self.description.unwrap_or_default();
        RawEntity {
            identity: self
                .operator_address
                .unwrap_or_else(|| format!("addr-{}", index)),
            display_name: description
                .moniker
                .unwrap_or_else(|| format!("Validator {}", index)),
            weight,
            description: description
                .details
                .unwrap_or_else(|| "No details provided.".to_string()),
        }
    }
}

pub struct HttpValidatorSource {
    client: Client,
    base: String,
    page_limit: u32,
    token_denom: f64,
}

impl HttpValidatorSource {
    pub fn new(cfg: &Config) -> Self {
        Self {
            client: Client::new(),
            base: cfg.staking_base.clone(),
            page_limit: cfg.validator_page_limit,
            token_denom: cfg.token_denom,
        }
    }
}

#[async_trait]
impl ValidatorSource for HttpValidatorSource {
    async fn validators(&self) -> Result<Vec<RawEntity>> {
        let url = format!("{}/validators?pagination.limit={}", self.base, self.page_limit);
        let dto: ValidatorPageDto = self
            .client
            .get(&url)
            .send()
            .await
            .context("validator request failed")?
            .error_for_status()
            .context("validator request rejected")?
            .json()
            .await
            .context("validator payload malformed")?;
        Ok(dto
            .validators
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.into_raw(i, self.token_denom))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_payload_parses() {
        let payload = r#"{
            "validators": [
                {
                    "operator_address": "cosmosvaloper1abc",
                    "tokens": "2500000000",
                    "description": { "moniker": "Nimbus", "details": "Runs relays." }
                }
            ]
        }"#;
        let dto: ValidatorPageDto = serde_json::from_str(payload).unwrap();
        let raw = dto.validators.into_iter().next().unwrap().into_raw(0, 1_000_000.0);
        assert_eq!(raw.identity, "cosmosvaloper1abc");
        assert_eq!(raw.display_name, "Nimbus");
        assert_eq!(raw.weight, 2500.0);
        assert_eq!(raw.description, "Runs relays.");
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let dto: ValidatorPageDto = serde_json::from_str(r#"{"validators":[{}]}"#).unwrap();
        let raw = dto.validators.into_iter().next().unwrap().into_raw(3, 1_000_000.0);
        assert_eq!(raw.identity, "addr-3");
        assert_eq!(raw.display_name, "Validator 3");
        assert_eq!(raw.weight, 0.0);
        assert_eq!(raw.description, "No details provided.");
    }

    #[test]
    fn test_unparseable_tokens_degrade_to_zero() {
        let dto: ValidatorPageDto =
            serde_json::from_str(r#"{"validators":[{"tokens":"not-a-number"}]}"#).unwrap();
        let raw = dto.validators.into_iter().next().unwrap().into_raw(0, 1_000_000.0);
        assert_eq!(raw.weight, 0.0);
    }

    #[test]
    fn test_empty_page_is_valid() {
        let dto: ValidatorPageDto = serde_json::from_str("{}").unwrap();
        assert!(dto.validators.is_empty());
    }
}

use std::net::IpAddr;
use indexmap::IndexMap;
use serde::Deserialize;
use shared::types::EndpointKey;
use super::document::ServerConfig;

/// Unvalidated input for a new server, as typed by an operator.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerDraft {
    pub address: String,
    pub port: i64,
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub notes: IndexMap<String, String>,
}

/// One reason a draft was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Problem {
    #[error("Invalid IP: {0}")]
    InvalidAddress(String),
    #[error("Invalid port: {0}")]
    InvalidPort(i64),
    #[error("Invalid country: {0}")]
    InvalidCountry(String),
    #[error("Server already in list: {0}")]
    Duplicate(EndpointKey),
}

/// Check every invariant of a draft against the current registry.
///
/// All problems are collected, in address/port/country/duplicate order.
/// The duplicate check only runs once address and port are both valid.
pub fn validate(
    draft: &ServerDraft,
    servers: &IndexMap<EndpointKey, ServerConfig>,
) -> Result<(EndpointKey, ServerConfig), Vec<Problem>> {
    let mut problems = Vec::new();

    let address = draft.address.trim().parse::<IpAddr>().ok();
    if address.is_none() {
        problems.push(Problem::InvalidAddress(draft.address.clone()));
    }

    let port = u16::try_from(draft.port).ok().filter(|port| *port != 0);
    if port.is_none() {
        problems.push(Problem::InvalidPort(draft.port));
    }

    let country = draft.country.trim().to_lowercase();
    if !valid_country(&country) {
        problems.push(Problem::InvalidCountry(country.clone()));
    }

    let key = match (address, port) {
        (Some(address), Some(port)) => Some(EndpointKey::new(address, port)),
        _ => None,
    };

    if let Some(key) = key {
        if servers.contains_key(&key) {
            problems.push(Problem::Duplicate(key));
        }
    }

    match key {
        Some(key) if problems.is_empty() => Ok((
            key,
            ServerConfig {
                name: draft.name.clone(),
                country,
                notes: draft.notes.clone(),
            },
        )),
        _ => Err(problems),
    }
}

fn valid_country(code: &str) -> bool {
    code.len() == 2 && isocountry::CountryCode::for_alpha2_caseless(code).is_ok()
}

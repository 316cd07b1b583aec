use std::fmt::Write;
use std::time::Duration;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use shared::protocol::{flag_emoji, relative_timestamp, BLANK, STATUS_TITLE};
use shared::types::{Embed, EmbedField, EndpointKey};
use crate::store::document::ServerConfig;
use super::poller::StatusCache;

/// Build the display for a watch group.
///
/// One field per endpoint in the given order, then a summary field with the
/// render time and how long the poll took. Endpoints missing from the
/// registry get a placeholder instead of an error.
pub fn render(
    servers: &[EndpointKey],
    registry: &IndexMap<EndpointKey, ServerConfig>,
    statuses: &StatusCache,
    elapsed: Duration,
    now: DateTime<Utc>,
) -> Embed {
    let mut fields: Vec<EmbedField> = servers
        .iter()
        .map(|key| match registry.get(key) {
            Some(server) => server_field(key, server, statuses),
            None => missing_field(key),
        })
        .collect();

    fields.push(EmbedField {
        name: BLANK.to_string(),
        value: format!(
            "Last updated {}\nQuery took `{:.2} seconds`",
            relative_timestamp(now),
            elapsed.as_secs_f64()
        ),
        inline: false,
    });

    Embed {
        title: STATUS_TITLE.to_string(),
        description: format!("{}\n", BLANK),
        fields,
    }
}

fn missing_field(key: &EndpointKey) -> EmbedField {
    EmbedField {
        name: format!(":grey_question: {}", key),
        value: "Server not in config!".to_string(),
        inline: false,
    }
}

fn server_field(key: &EndpointKey, server: &ServerConfig, statuses: &StatusCache) -> EmbedField {
    let flag = flag_emoji(&server.country);

    let (name, mut value) = match statuses.get(key).and_then(|status| status.online()) {
        Some(info) => (
            format!("{} {}", flag, info.server_name),
            format!(
                "**IP:** {}\n**Player count:** {}/{}\n**Map:** {}",
                key, info.player_count, info.max_players, info.map_name
            ),
        ),
        None => (
            format!("{} {} **[OFFLINE]**", flag, server.name),
            format!("**IP:** {}\n**Player count:** N/A\n**Map:** N/A", key),
        ),
    };

    for (k, v) in &server.notes {
        let _ = write!(value, "\n**{}:** {}", k, v);
    }

    EmbedField { name, value, inline: false }
}

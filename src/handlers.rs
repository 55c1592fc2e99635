pub mod activities;
pub mod board;
pub mod clients;
pub mod stats;

use uuid::Uuid;

// "a,b,c" -> lista de UUIDs. Entrada que não parseia é descartada com warn:
// problema de qualidade de dado do chamador, não motivo para derrubar a rota.
pub(crate) fn parse_units(raw: Option<&str>) -> Vec<Uuid> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match Uuid::parse_str(s) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("Id de unidade inválido '{}', ignorado", s);
                None
            }
        })
        .collect()
}

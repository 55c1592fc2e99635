// src/services/bucketizer.rs

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::models::stats::DailyCountRow;

pub type DayBuckets = BTreeMap<NaiveDate, HashMap<String, i64>>;

// Todos os dias de [start, end), em ordem.
pub fn day_span(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = start;
    while day < end {
        days.push(day);
        day = day.succ_opt().expect("data fora do alcance do chrono");
    }
    days
}

// Agrupa linhas cruas em baldes diários por categoria.
//
// Garantias:
// - TODO dia de [start, end) aparece na saída, mesmo zerado (a tabela que
//   consome não pode ter buracos).
// - Linha com dia ausente/inválido ou categoria ausente é descartada com um
//   warn. Problema de qualidade de dado, não erro fatal.
// - Linhas repetidas de (dia, categoria) acumulam.
// - Dia fora da faixa é ignorado (a consulta já deveria ter filtrado).
pub fn bucketize(start: NaiveDate, end: NaiveDate, rows: &[DailyCountRow]) -> DayBuckets {
    let mut buckets: DayBuckets = day_span(start, end)
        .into_iter()
        .map(|d| (d, HashMap::new()))
        .collect();

    for row in rows {
        let Some(day_str) = row.day.as_deref() else {
            tracing::warn!("Linha de contagem sem dia, descartada");
            continue;
        };

        let day = match NaiveDate::parse_from_str(day_str, "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => {
                tracing::warn!("Dia não reconhecido '{}', linha descartada", day_str);
                continue;
            }
        };

        let Some(category) = row.category.as_deref() else {
            tracing::warn!("Linha de contagem sem categoria no dia {}, descartada", day);
            continue;
        };

        let Some(bucket) = buckets.get_mut(&day) else {
            continue;
        };

        *bucket.entry(category.to_string()).or_insert(0) += row.total.unwrap_or(0);
    }

    buckets
}

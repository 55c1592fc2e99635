// src/services/rates.rs

// Percentual de conversão à prova de divisão por zero: denominador 0 vira 0,
// nunca NaN nem infinito. Usada igualmente nas linhas diárias e na de totais
// (os totais somam numeradores e denominadores ANTES de dividir).
pub fn rate(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64 * 100.0
    } else {
        0.0
    }
}

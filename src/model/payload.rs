//! Payload accessor: null-tolerant field access and pt-BR currency parsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical payload keys, as written by the ingestion pipeline.
pub mod fields {
    pub const NUMERO_IMOVEL: &str = "Nº do imóvel";
    pub const CIDADE: &str = "Cidade";
    pub const BAIRRO: &str = "Bairro";
    pub const ENDERECO: &str = "Endereço";
    pub const PRECO: &str = "Preço";
    pub const VALOR_AVALIACAO: &str = "Valor de avaliação";
    pub const DESCONTO: &str = "Desconto";
    pub const DESCRICAO: &str = "Descrição";
    pub const MODALIDADE: &str = "Modalidade de venda";
    pub const LINK: &str = "Link de acesso";
}

/// The per-record attribute map. Values are opaque strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(HashMap<String, String>);

impl Payload {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Parse a stored `payload_json` document.
    ///
    /// Must be a JSON object. Scalars are kept as their textual form,
    /// `null` members are dropped, nested values keep their JSON text.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        use serde_json::Value;

        let serde_json::Value::Object(members) = value else {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "payload is not a JSON object",
            ));
        };

        let mut map = HashMap::with_capacity(members.len());
        for (key, value) in members {
            let text = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                nested @ (Value::Array(_) | Value::Object(_)) => nested.to_string(),
            };
            map.insert(key, text);
        }
        Ok(Self(map))
    }

    /// Field value with surrounding whitespace removed. `None` when the key
    /// is absent or the value is blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// Field value parsed with [`parse_currency`].
    pub fn currency(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(parse_currency)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parse a pt-BR formatted amount: `.` groups thousands, `,` marks decimals.
///
/// `"1.234,56"` → `1234.56`. Surrounding whitespace is ignored and a single
/// leading sign is accepted. Anything else left after removing the
/// separators (currency symbols, letters, a second decimal mark) yields
/// `None`.
pub fn parse_currency(raw: &str) -> Option<f64> {
    let normalized: String = raw
        .trim()
        .chars()
        .filter(|&c| c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let unsigned = normalized
        .strip_prefix(|c: char| c == '-' || c == '+')
        .unwrap_or(&normalized);

    let mut digits = 0usize;
    let mut points = 0usize;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return None,
        }
    }
    if digits == 0 || points > 1 {
        return None;
    }

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_currency_grouped() {
        assert_eq!(parse_currency("1.234,56"), Some(1234.56));
        assert_eq!(parse_currency("1.234.567,89"), Some(1_234_567.89));
        assert_eq!(parse_currency("250.000,00"), Some(250_000.0));
    }

    #[test]
    fn test_parse_currency_plain() {
        assert_eq!(parse_currency("100"), Some(100.0));
        assert_eq!(parse_currency("0,5"), Some(0.5));
        assert_eq!(parse_currency(",5"), Some(0.5));
        assert_eq!(parse_currency("  42 "), Some(42.0));
    }

    #[test]
    fn test_parse_currency_signed() {
        assert_eq!(parse_currency("-1.500,00"), Some(-1500.0));
        assert_eq!(parse_currency("+7,25"), Some(7.25));
        assert_eq!(parse_currency("--1"), None);
        assert_eq!(parse_currency("1-"), None);
    }

    #[test]
    fn test_parse_currency_empty() {
        assert_eq!(parse_currency(""), None);
        assert_eq!(parse_currency("   "), None);
        assert_eq!(parse_currency("-"), None);
        assert_eq!(parse_currency(","), None);
        assert_eq!(parse_currency("."), None);
    }

    #[test]
    fn test_parse_currency_multiple_decimal_marks() {
        assert_eq!(parse_currency("1,2,3"), None);
        assert_eq!(parse_currency("1.000,00,00"), None);
    }

    #[test]
    fn test_parse_currency_residue() {
        assert_eq!(parse_currency("12abc"), None);
        assert_eq!(parse_currency("R$ 10,00"), None);
        assert_eq!(parse_currency("10,00 "), Some(10.0));
        assert_eq!(parse_currency("10 000"), None);
        assert_eq!(parse_currency("NaN"), None);
        assert_eq!(parse_currency("inf"), None);
        assert_eq!(parse_currency("1e5"), None);
    }

    #[test]
    fn test_payload_from_json() {
        let payload = Payload::from_json_str(
            r#"{"Cidade": "Campinas", "Preço": "100.000,00", "Andar": 3, "Bairro": null}"#,
        )
        .unwrap();
        assert_eq!(payload.get(fields::CIDADE), Some("Campinas"));
        assert_eq!(payload.get("Andar"), Some("3"));
        assert_eq!(payload.get(fields::BAIRRO), None);
        assert_eq!(payload.currency(fields::PRECO), Some(100_000.0));
    }

    #[test]
    fn test_payload_rejects_non_object() {
        assert!(Payload::from_json_str("[1, 2]").is_err());
        assert!(Payload::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_missing_key_is_none() {
        let payload = Payload::new().with(fields::CIDADE, "Santos");
        assert_eq!(payload.get(fields::MODALIDADE), None);
        assert_eq!(payload.currency(fields::PRECO), None);
    }

    #[test]
    fn test_blank_values_are_missing() {
        let payload = Payload::new()
            .with(fields::CIDADE, "   ")
            .with(fields::BAIRRO, "")
            .with(fields::MODALIDADE, " Venda Online ");
        assert_eq!(payload.get(fields::CIDADE), None);
        assert_eq!(payload.get(fields::BAIRRO), None);
        assert_eq!(payload.get(fields::MODALIDADE), Some("Venda Online"));
        assert_eq!(payload.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_grouped_amounts_roundtrip(int in 0u64..10_000_000_000, cents in 0u32..100) {
            let digits = int.to_string();
            let mut grouped = String::new();
            for (i, c) in digits.chars().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    grouped.push('.');
                }
                grouped.push(c);
            }
            let raw = format!("{grouped},{cents:02}");
            let expected = int as f64 + cents as f64 / 100.0;
            let parsed = parse_currency(&raw).unwrap();
            prop_assert!((parsed - expected).abs() <= expected * 1e-12 + 1e-9);
        }

        #[test]
        fn prop_letters_never_parse(prefix in "[0-9]{1,6}", suffix in "[a-zA-Z$ ]{0,3}[a-zA-Z$]") {
            prop_assert_eq!(parse_currency(&format!("{prefix}{suffix}")), None);
        }
    }
}

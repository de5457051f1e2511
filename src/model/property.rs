//! Property: one auction record.

use serde::{Deserialize, Serialize};

use super::payload::{fields, Payload};

/// Unique identity of a record: state plus the registry number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKey {
    pub uf: String,
    pub numero_imovel: String,
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.uf, self.numero_imovel)
    }
}

/// A record as returned by listings: `(uf, numero_imovel, payload)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub uf: String,
    pub numero_imovel: String,
    pub payload: Payload,
}

impl Property {
    pub fn new(uf: impl Into<String>, numero_imovel: impl Into<String>) -> Self {
        Self {
            uf: uf.into(),
            numero_imovel: numero_imovel.into(),
            payload: Payload::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.payload.insert(key, value);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn key(&self) -> PropertyKey {
        PropertyKey {
            uf: self.uf.clone(),
            numero_imovel: self.numero_imovel.clone(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.payload.get(key)
    }

    pub fn city(&self) -> Option<&str> { self.get(fields::CIDADE) }
    pub fn neighborhood(&self) -> Option<&str> { self.get(fields::BAIRRO) }
    pub fn modality(&self) -> Option<&str> { self.get(fields::MODALIDADE) }

    /// Parsed `Preço`.
    pub fn price(&self) -> Option<f64> {
        self.payload.currency(fields::PRECO)
    }

    /// Parsed `Valor de avaliação`.
    pub fn appraisal(&self) -> Option<f64> {
        self.payload.currency(fields::VALOR_AVALIACAO)
    }

    /// Parsed `Desconto` (percentage points as published).
    pub fn discount(&self) -> Option<f64> {
        self.payload.currency(fields::DESCONTO)
    }
}

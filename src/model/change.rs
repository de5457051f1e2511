//! Daily change feed: records that entered, left or changed on a given day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::filter::split_multi;
use super::payload::Payload;
use super::property::PropertyKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// The record appeared in the day's load.
    Enter,
    /// The record was present the day before and is gone.
    Exit,
    /// The record is present on both days with a different payload.
    Update,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Enter, ChangeKind::Exit, ChangeKind::Update];

    /// Parse the stored `tipo_evento` tag. Case and surrounding whitespace
    /// are ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ENTER" => Some(ChangeKind::Enter),
            "EXIT" => Some(ChangeKind::Exit),
            "UPDATE" => Some(ChangeKind::Update),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Enter => "ENTER",
            ChangeKind::Exit => "EXIT",
            ChangeKind::Update => "UPDATE",
        }
    }
}

/// One row of the `changes` table.
///
/// `before` is the payload from the previous day and `after` the payload
/// from `dt`; either is `None` when absent or malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub dt: NaiveDate,
    pub kind: ChangeKind,
    pub uf: String,
    pub numero_imovel: String,
    pub changed_fields: Vec<String>,
    pub before: Option<Payload>,
    pub after: Option<Payload>,
}

impl ChangeEvent {
    pub fn new(dt: NaiveDate, kind: ChangeKind, uf: impl Into<String>, numero_imovel: impl Into<String>) -> Self {
        Self {
            dt,
            kind,
            uf: uf.into(),
            numero_imovel: numero_imovel.into(),
            changed_fields: Vec::new(),
            before: None,
            after: None,
        }
    }

    pub fn with_before(mut self, payload: Payload) -> Self {
        self.before = Some(payload);
        self
    }

    pub fn with_after(mut self, payload: Payload) -> Self {
        self.after = Some(payload);
        self
    }

    /// Set the changed payload keys from their stored comma-joined form.
    pub fn with_changed_fields(mut self, raw: &str) -> Self {
        self.changed_fields = split_multi(raw);
        self
    }

    pub fn key(&self) -> PropertyKey {
        PropertyKey {
            uf: self.uf.clone(),
            numero_imovel: self.numero_imovel.clone(),
        }
    }

    /// The payload the event is shown and filtered by: the last known state
    /// for an exit, the new state otherwise.
    pub fn view(&self) -> Option<&Payload> {
        match self.kind {
            ChangeKind::Exit => self.before.as_ref(),
            ChangeKind::Enter | ChangeKind::Update => self.after.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fields;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(ChangeKind::parse("ENTER"), Some(ChangeKind::Enter));
        assert_eq!(ChangeKind::parse(" exit "), Some(ChangeKind::Exit));
        assert_eq!(ChangeKind::parse("Update"), Some(ChangeKind::Update));
        assert_eq!(ChangeKind::parse("DELETE"), None);
        for kind in ChangeKind::ALL {
            assert_eq!(ChangeKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_view_follows_kind() {
        let before = Payload::new().with(fields::CIDADE, "Campinas");
        let after = Payload::new().with(fields::CIDADE, "Sorocaba");

        let exit = ChangeEvent::new(day(), ChangeKind::Exit, "SP", "1")
            .with_before(before.clone())
            .with_after(after.clone());
        assert_eq!(exit.view(), Some(&before));

        let update = ChangeEvent { kind: ChangeKind::Update, ..exit.clone() };
        assert_eq!(update.view(), Some(&after));

        let enter = ChangeEvent::new(day(), ChangeKind::Enter, "SP", "2").with_before(before);
        assert_eq!(enter.view(), None);
    }

    #[test]
    fn test_changed_fields_split() {
        let e = ChangeEvent::new(day(), ChangeKind::Update, "SP", "1").with_changed_fields("Preço,Desconto,");
        assert_eq!(e.changed_fields, vec!["Preço".to_string(), "Desconto".to_string()]);
    }

    #[test]
    fn test_kind_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&ChangeKind::Update).unwrap(), r#""UPDATE""#);
    }
}

//! Data model of the daily clipping.
//!
//! Field names are the Portuguese keys the classifier is instructed to
//! produce and the presentation layer reads, hence the non-English names.
//! Keys the model adds beyond the requested ones are kept in `extra` and
//! written back out untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The canonical clipping document.
///
/// Every field is kept as the classifier typed it. Shape problems inside a
/// valid JSON reply are reported as warnings by the validator, never as
/// deserialization failures.
///
/// # Fields
///
/// * `data_clipping` - Edition date as the classifier reported it
/// * `noticias` - Selected stories; always serialized, even when empty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredClipping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_clipping: Option<Value>,
    #[serde(default)]
    pub noticias: Vec<NewsEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An element of `noticias`: a story object, or anything else the model put
/// in the list, written back out as it came.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NewsEntry {
    Item(NewsItem),
    Other(Value),
}

/// One selected story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagina: Option<PageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titulo: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumo_120_chars: Option<Value>,
    /// Free-form relevance label or score.
    #[serde(
        rename = "relevância",
        alias = "relevancia",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub relevancia: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Page reference as the model wrote it: usually a number, sometimes text
/// such as `"2"` or `"2-3"`, occasionally something else (`2.0`, `[4, 5]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Number(u32),
    Text(String),
    Other(Value),
}

impl PageRef {
    /// The page as a number when it is one, is text holding one, or is a
    /// float with no fractional part.
    pub fn number(&self) -> Option<u32> {
        match self {
            PageRef::Number(n) => Some(*n),
            PageRef::Text(s) => s.trim().parse().ok(),
            PageRef::Other(Value::Number(n)) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX))
                .map(|f| f as u32),
            PageRef::Other(_) => None,
        }
    }
}

impl NewsItem {
    /// Title when it is non-blank text.
    pub fn title(&self) -> Option<&str> {
        self.titulo
            .as_ref()
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
    }
}

impl NewsEntry {
    pub fn item(&self) -> Option<&NewsItem> {
        match self {
            NewsEntry::Item(item) => Some(item),
            NewsEntry::Other(_) => None,
        }
    }
}

impl StructuredClipping {
    pub fn item_count(&self) -> usize {
        self.noticias.len()
    }

    /// Edition label when the classifier gave it as text.
    pub fn edition_label(&self) -> Option<&str> {
        self.data_clipping.as_ref().and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_keeps_unknown_keys() {
        let value = json!({
            "data_clipping": "16/10/2026",
            "fonte": "Diário de Santa Maria",
            "noticias": [{
                "pagina": 2,
                "titulo": "Câmara aprova orçamento",
                "resumo_120_chars": "Vereadores aprovam LDO.",
                "relevância": "alta",
                "secretaria": "Fazenda"
            }]
        });

        let clipping: StructuredClipping = serde_json::from_value(value).unwrap();

        assert_eq!(clipping.extra.get("fonte"), Some(&json!("Diário de Santa Maria")));
        let item = clipping.noticias[0].item().unwrap();
        assert_eq!(item.pagina, Some(PageRef::Number(2)));
        assert_eq!(item.relevancia, Some(json!("alta")));
        assert_eq!(item.extra.get("secretaria"), Some(&json!("Fazenda")));
    }

    #[test]
    fn test_unaccented_relevance_key_is_accepted_and_written_accented() {
        let item: NewsItem =
            serde_json::from_value(json!({"titulo": "Obra", "relevancia": 3})).unwrap();
        assert_eq!(item.relevancia, Some(json!(3)));

        let out = serde_json::to_value(&item).unwrap();
        assert_eq!(out, json!({"titulo": "Obra", "relevância": 3}));
    }

    #[test]
    fn test_empty_noticias_still_serialized() {
        let clipping = StructuredClipping::default();
        assert_eq!(serde_json::to_value(&clipping).unwrap(), json!({"noticias": []}));
    }

    #[test]
    fn test_page_ref_number() {
        assert_eq!(PageRef::Number(4).number(), Some(4));
        assert_eq!(PageRef::Text(" 7 ".into()).number(), Some(7));
        assert_eq!(PageRef::Text("2-3".into()).number(), None);
        assert_eq!(PageRef::Other(json!(2.0)).number(), Some(2));
        assert_eq!(PageRef::Other(json!(2.5)).number(), None);
        assert_eq!(PageRef::Other(json!([4, 5])).number(), None);
    }

    #[test]
    fn test_oddly_typed_values_survive_a_round_trip() {
        let value = json!({
            "data_clipping": 20261016,
            "noticias": [
                {"pagina": [4, 5], "titulo": 42},
                {"pagina": 2.0, "titulo": "Obra"},
                "nota solta"
            ]
        });

        let clipping: StructuredClipping = serde_json::from_value(value.clone()).unwrap();

        assert_eq!(clipping.item_count(), 3);
        assert_eq!(clipping.edition_label(), None);
        let first = clipping.noticias[0].item().unwrap();
        assert_eq!(first.pagina, Some(PageRef::Other(json!([4, 5]))));
        assert_eq!(first.title(), None);
        assert_eq!(clipping.noticias[1].item().and_then(NewsItem::title), Some("Obra"));
        assert!(clipping.noticias[2].item().is_none());
        assert_eq!(serde_json::to_value(&clipping).unwrap(), value);
    }
}

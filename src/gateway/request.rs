//! Client tag selections.

use crate::core::error::GatewayError;

/// One tag or a list of tags.
///
/// Single-tag and multi-tag reads return the same merged map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSelection {
    One(String),
    Many(Vec<String>),
}

impl TagSelection {
    pub fn into_tags(self) -> Vec<String> {
        match self {
            Self::One(tag) => vec![tag],
            Self::Many(tags) => tags,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(tags) => tags.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for TagSelection {
    fn from(tag: &str) -> Self {
        Self::One(tag.to_string())
    }
}

impl From<String> for TagSelection {
    fn from(tag: String) -> Self {
        Self::One(tag)
    }
}

impl From<Vec<String>> for TagSelection {
    fn from(tags: Vec<String>) -> Self {
        Self::Many(tags)
    }
}

impl From<Vec<&str>> for TagSelection {
    fn from(tags: Vec<&str>) -> Self {
        Self::Many(tags.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for TagSelection {
    fn from(tags: &[&str]) -> Self {
        Self::Many(tags.iter().map(|t| t.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for TagSelection {
    fn from(tags: [&str; N]) -> Self {
        Self::Many(tags.iter().map(|t| t.to_string()).collect())
    }
}

impl TryFrom<serde_json::Value> for TagSelection {
    type Error = GatewayError;

    /// Accepts a string or an array of strings.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(tag) => Ok(Self::One(tag)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::String(tag) => Ok(tag),
                    other => Err(GatewayError::InvalidRequest(format!(
                        "tag list entries must be strings, got {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Many),
            other => Err(GatewayError::InvalidRequest(format!(
                "tags must be a string or an array of strings, got {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json() {
        assert_eq!(
            TagSelection::try_from(json!("Speed")).unwrap(),
            TagSelection::One("Speed".into())
        );
        assert_eq!(
            TagSelection::try_from(json!(["A", "plc2/B"])).unwrap().into_tags(),
            vec!["A", "plc2/B"]
        );
    }

    #[test]
    fn test_invalid_shapes() {
        for bad in [json!(5), json!({ "tag": "A" }), json!(null), json!(["A", 1])] {
            assert!(matches!(
                TagSelection::try_from(bad),
                Err(GatewayError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_conversions() {
        assert_eq!(TagSelection::from("A").len(), 1);
        assert_eq!(TagSelection::from(["A", "B"]).into_tags(), vec!["A", "B"]);
        assert!(TagSelection::from(Vec::<String>::new()).is_empty());
    }
}

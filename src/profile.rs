use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::catalog::IndexSelection;
use crate::domain::{DatasetIdentifierRecord, NormalizedId};
use crate::error::WpsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Node {
    #[serde(rename = "DKRZ")]
    Dkrz,
    #[serde(rename = "ORNL")]
    Ornl,
}

impl Node {
    pub const NAMES: &'static [&'static str] = &["ORNL", "DKRZ"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Dkrz => "DKRZ",
            Node::Ornl => "ORNL",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Node {
    type Err = WpsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "DKRZ" => Ok(Node::Dkrz),
            "ORNL" => Ok(Node::Ornl),
            _ => Err(WpsError::InvalidNode {
                node: value.to_string(),
                allowed: Node::NAMES,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeProfile {
    pub node: Node,
    pub indices: &'static [(&'static str, bool)],
    pub namespace: Option<&'static str>,
}

static PROFILES: [NodeProfile; 2] = [
    NodeProfile {
        node: Node::Ornl,
        indices: &[("anl-dev", false), ("ornl-dev", true)],
        namespace: Some("css03_data"),
    },
    NodeProfile {
        node: Node::Dkrz,
        indices: &[
            ("anl-dev", false),
            ("ornl-dev", false),
            ("esgf-node.llnl.gov", true),
        ],
        namespace: None,
    },
];

pub fn profiles() -> &'static [NodeProfile] {
    &PROFILES
}

pub fn resolve(node: &str) -> Result<&'static NodeProfile, WpsError> {
    let node: Node = node.parse()?;
    PROFILES
        .iter()
        .find(|profile| profile.node == node)
        .ok_or_else(|| WpsError::InvalidNode {
            node: node.to_string(),
            allowed: Node::NAMES,
        })
}

impl NodeProfile {
    pub fn index_selection(&self) -> IndexSelection {
        IndexSelection::from_pairs(self.indices.iter().copied())
    }

    pub fn enabled_index(&self) -> Option<&'static str> {
        self.indices
            .iter()
            .find(|(_, enabled)| *enabled)
            .map(|(name, _)| *name)
    }

    pub fn normalize(&self, record: &DatasetIdentifierRecord) -> Result<NormalizedId, WpsError> {
        let composite = record.primary().ok_or(WpsError::MalformedRecord)?;
        Ok(self.normalize_str(composite))
    }

    pub fn normalize_str(&self, composite: &str) -> NormalizedId {
        let base = composite
            .split_once('|')
            .map(|(head, _)| head)
            .unwrap_or(composite);
        match self.namespace {
            Some(prefix) => NormalizedId::new(format!("{prefix}.{base}")),
            None => NormalizedId::new(base),
        }
    }
}

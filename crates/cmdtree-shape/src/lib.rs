//! Shared shape model for cmdtree programs.
//!
//! A shape is the interface of a command tree (summaries, flags, anonymous
//! argument grammar, subcommands) without any of its behavior. Shapes are
//! used for:
//! - rendering help for a whole tree without running anything
//! - answering the shape query of a parent program that delegates to us
//!
//! The wire format is a JSON envelope carrying a `format-version`. Readers
//! accept every version in [`SUPPORTED_VERSIONS`] and upgrade to the latest;
//! writers downgrade to whatever the asking side understands.

pub mod grammar;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use grammar::{Grammar, GrammarError};

/// Set by a parent program when it asks a child for its shape.
///
/// The value is a JSON array of the format versions the parent can read.
pub const SHAPE_ENV_VAR: &str = "CMDTREE_OUTPUT_SHAPE";

pub const SUPPORTED_VERSIONS: [u32; 2] = [1, 2];
pub const LATEST_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("malformed shape payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported shape format-version {0}")]
    UnsupportedVersion(u32),
    #[error("no shape format-version in common (offered: {offered:?}, supported: {supported:?})")]
    NoCommonVersion { offered: Vec<u32>, supported: Vec<u32> },
}

/// Delegated executable as seen from the program that declares it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ExecShape {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    pub working_dir: PathBuf,
    pub path_to_exe: PathBuf,
}

impl ExecShape {
    /// Path of the executable, resolved against the working directory.
    pub fn resolved_path(&self) -> PathBuf {
        if self.path_to_exe.is_absolute() {
            self.path_to_exe.clone()
        } else {
            self.working_dir.join(&self.path_to_exe)
        }
    }
}

pub mod v1 {
    //! First format: anonymous arguments are only described by their usage.

    use super::ExecShape;
    use indexmap::IndexMap;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "kebab-case")]
    pub struct FlagShape {
        pub name: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        pub doc: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub aliases: Vec<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "kebab-case")]
    pub struct BasicShape {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        pub summary: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub readme: Option<String>,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        pub anons: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub flags: Vec<FlagShape>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
    #[serde(rename_all = "kebab-case")]
    pub struct GroupShape {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        pub summary: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub readme: Option<String>,
        #[serde(default)]
        pub subcommands: IndexMap<String, Shape>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum Shape {
        Basic(BasicShape),
        Group(GroupShape),
        Exec(ExecShape),
    }
}

/// How often a flag may or must appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Occurrences {
    Required,
    #[default]
    Optional,
    Listed,
    OneOrMore,
    /// Swallows the rest of the command line.
    Escape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct FlagShape {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub occurrences: Occurrences,
    #[serde(default)]
    pub takes_arg: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct BasicShape {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(default)]
    pub anons: Grammar,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct GroupShape {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
    #[serde(default)]
    pub subcommands: IndexMap<String, Shape>,
    #[serde(default)]
    pub has_default_body: bool,
}

/// The latest shape format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Shape {
    Basic(BasicShape),
    Group(GroupShape),
    Exec(ExecShape),
}

impl Shape {
    pub fn summary(&self) -> &str {
        match self {
            Self::Basic(b) => &b.summary,
            Self::Group(g) => &g.summary,
            Self::Exec(e) => &e.summary,
        }
    }

    pub fn readme(&self) -> Option<&str> {
        match self {
            Self::Basic(b) => b.readme.as_deref(),
            Self::Group(g) => g.readme.as_deref(),
            Self::Exec(e) => e.readme.as_deref(),
        }
    }

    /// Project onto an older format.
    pub fn downgrade(&self, version: u32) -> Result<Versioned, ShapeError> {
        match version {
            1 => Ok(Versioned::V1(self.to_v1())),
            2 => Ok(Versioned::V2(self.clone())),
            other => Err(ShapeError::UnsupportedVersion(other)),
        }
    }

    fn to_v1(&self) -> v1::Shape {
        match self {
            Self::Basic(b) => v1::Shape::Basic(v1::BasicShape {
                summary: b.summary.clone(),
                readme: b.readme.clone(),
                anons: b.anons.usage(),
                flags: b
                    .flags
                    .iter()
                    .map(|f| v1::FlagShape {
                        name: f.name.clone(),
                        doc: f.doc.clone(),
                        aliases: f.aliases.clone(),
                    })
                    .collect(),
            }),
            Self::Group(g) => v1::Shape::Group(v1::GroupShape {
                summary: g.summary.clone(),
                readme: g.readme.clone(),
                subcommands: g
                    .subcommands
                    .iter()
                    .map(|(name, sub)| (name.clone(), sub.to_v1()))
                    .collect(),
            }),
            Self::Exec(e) => v1::Shape::Exec(e.clone()),
        }
    }

    fn from_v1(shape: v1::Shape) -> Self {
        match shape {
            v1::Shape::Basic(b) => Self::Basic(BasicShape {
                summary: b.summary,
                readme: b.readme,
                anons: if b.anons.is_empty() {
                    Grammar::Zero
                } else {
                    Grammar::AdHoc(b.anons)
                },
                flags: b
                    .flags
                    .into_iter()
                    .map(|f| FlagShape {
                        name: f.name,
                        doc: f.doc,
                        aliases: f.aliases,
                        occurrences: Occurrences::default(),
                        takes_arg: false,
                    })
                    .collect(),
            }),
            v1::Shape::Group(g) => Self::Group(GroupShape {
                summary: g.summary,
                readme: g.readme,
                subcommands: g
                    .subcommands
                    .into_iter()
                    .map(|(name, sub)| (name, Self::from_v1(sub)))
                    .collect(),
                has_default_body: false,
            }),
            v1::Shape::Exec(e) => Self::Exec(e),
        }
    }
}

/// A shape tagged with its format version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Versioned {
    V1(v1::Shape),
    V2(Shape),
}

/// JSON payload exchanged between programs.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Envelope {
    format_version: u32,
    shape: serde_json::Value,
}

impl Versioned {
    pub fn version(&self) -> u32 {
        match self {
            Self::V1(_) => 1,
            Self::V2(_) => 2,
        }
    }

    pub fn upgrade(self) -> Shape {
        match self {
            Self::V1(shape) => Shape::from_v1(shape),
            Self::V2(shape) => shape,
        }
    }

    pub fn to_json(&self) -> Result<String, ShapeError> {
        let shape = match self {
            Self::V1(shape) => serde_json::to_value(shape)?,
            Self::V2(shape) => serde_json::to_value(shape)?,
        };
        let envelope = Envelope {
            format_version: self.version(),
            shape,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    pub fn from_json(payload: &str) -> Result<Self, ShapeError> {
        let envelope: Envelope = serde_json::from_str(payload)?;
        match envelope.format_version {
            1 => Ok(Self::V1(serde_json::from_value(envelope.shape)?)),
            2 => Ok(Self::V2(serde_json::from_value(envelope.shape)?)),
            other => Err(ShapeError::UnsupportedVersion(other)),
        }
    }
}

/// Highest version present both in `offered` and in [`SUPPORTED_VERSIONS`].
pub fn negotiate(offered: &[u32]) -> Result<u32, ShapeError> {
    offered
        .iter()
        .copied()
        .filter(|v| SUPPORTED_VERSIONS.contains(v))
        .max()
        .ok_or_else(|| ShapeError::NoCommonVersion {
            offered: offered.to_vec(),
            supported: SUPPORTED_VERSIONS.to_vec(),
        })
}

/// Encode a version set for [`SHAPE_ENV_VAR`].
pub fn encode_versions(versions: &[u32]) -> String {
    serde_json::to_string(versions).unwrap_or_else(|_| "[]".to_string())
}

/// Decode the value of [`SHAPE_ENV_VAR`].
pub fn decode_versions(raw: &str) -> Result<Vec<u32>, ShapeError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v1() -> v1::Shape {
        let start = v1::Shape::Basic(v1::BasicShape {
            summary: "start the service".to_string(),
            readme: Some("Starts it.".to_string()),
            anons: "[ID]".to_string(),
            flags: vec![v1::FlagShape {
                name: "-name".to_string(),
                doc: "STRING service name".to_string(),
                aliases: vec!["-n".to_string()],
            }],
        });
        let remote = v1::Shape::Exec(ExecShape {
            summary: "remote tool".to_string(),
            readme: None,
            working_dir: PathBuf::from("/opt/tools"),
            path_to_exe: PathBuf::from("bin/remote"),
        });
        let mut subcommands = IndexMap::new();
        subcommands.insert("start".to_string(), start);
        subcommands.insert("remote".to_string(), remote);
        v1::Shape::Group(v1::GroupShape {
            summary: "manage services".to_string(),
            readme: None,
            subcommands,
        })
    }

    #[test]
    fn downgrade_inverts_upgrade_for_v1() {
        let shape = sample_v1();
        let upgraded = Versioned::V1(shape.clone()).upgrade();
        assert_eq!(upgraded.downgrade(1).unwrap(), Versioned::V1(shape));
    }

    #[test]
    fn upgrade_keeps_v1_usage_as_ad_hoc_grammar() {
        let Shape::Group(group) = Versioned::V1(sample_v1()).upgrade() else {
            panic!("expected group");
        };
        let Some(Shape::Basic(start)) = group.subcommands.get("start") else {
            panic!("expected basic start");
        };
        assert_eq!(start.anons, Grammar::AdHoc("[ID]".to_string()));
        assert_eq!(start.flags[0].occurrences, Occurrences::Optional);
    }

    #[test]
    fn envelope_round_trips_every_version() {
        let latest = Versioned::V1(sample_v1()).upgrade();
        for version in SUPPORTED_VERSIONS {
            let versioned = latest.downgrade(version).unwrap();
            let json = versioned.to_json().unwrap();
            assert!(json.contains(&format!("\"format-version\":{version}")), "{json}");
            assert_eq!(Versioned::from_json(&json).unwrap(), versioned);
        }
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = Versioned::from_json(r#"{"format-version":9,"shape":{}}"#).unwrap_err();
        assert!(matches!(err, ShapeError::UnsupportedVersion(9)));
        assert!(matches!(
            latest_basic().downgrade(3),
            Err(ShapeError::UnsupportedVersion(3))
        ));
    }

    fn latest_basic() -> Shape {
        Shape::Basic(BasicShape::default())
    }

    #[test]
    fn negotiation_picks_highest_shared_version() {
        assert_eq!(negotiate(&[1, 2, 7]).unwrap(), 2);
        assert_eq!(negotiate(&[1]).unwrap(), 1);
        assert!(matches!(
            negotiate(&[5, 6]),
            Err(ShapeError::NoCommonVersion { .. })
        ));
    }

    #[test]
    fn version_sets_round_trip() {
        let raw = encode_versions(&SUPPORTED_VERSIONS);
        assert_eq!(raw, "[1,2]");
        assert_eq!(decode_versions(&raw).unwrap(), vec![1, 2]);
        assert!(decode_versions("one,two").is_err());
    }

    #[test]
    fn relative_exec_paths_resolve_against_working_dir() {
        let exec = ExecShape {
            working_dir: PathBuf::from("/srv"),
            path_to_exe: PathBuf::from("bin/tool"),
            ..Default::default()
        };
        assert_eq!(exec.resolved_path(), PathBuf::from("/srv/bin/tool"));
    }
}

use kuchiki::NodeRef;
use serde::Serialize;

use crate::dom::{attr, tag_name};

/// Minimal classification of the script language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Classic,
    Module,
    /// Templates and data blocks; never executable.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptSource {
    Inline { code: String },
    External { src: String },
}

/// Where a collected script came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOrigin {
    /// An `<eval>` directive.
    Eval,
    /// A `<script>` inside markup merged for the given target id.
    Markup { target: String },
}

/// A script the merge would have run in a browser, handed to the caller instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedScript {
    pub origin: ScriptOrigin,
    pub kind: ScriptKind,
    pub source: ScriptSource,
}

impl CollectedScript {
    pub fn eval(code: String) -> Self {
        Self {
            origin: ScriptOrigin::Eval,
            kind: ScriptKind::Classic,
            source: ScriptSource::Inline { code },
        }
    }
}

/// Scripts found in freshly inserted nodes, in document order.
pub fn collect_scripts(nodes: &[NodeRef], target: &str) -> Vec<CollectedScript> {
    let mut collected = Vec::new();
    for script in nodes
        .iter()
        .flat_map(|node| node.inclusive_descendants())
        .filter(|node| tag_name(node).as_deref() == Some("script"))
    {
        let kind = classify_kind(attr(&script, "type").as_deref());
        if kind == ScriptKind::Unknown {
            continue;
        }

        let source = match attr(&script, "src").map(|src| src.trim().to_string()) {
            Some(src) if !src.is_empty() => ScriptSource::External { src },
            _ => {
                let code = script.text_contents();
                if code.trim().is_empty() {
                    continue;
                }
                ScriptSource::Inline { code }
            }
        };

        collected.push(CollectedScript {
            origin: ScriptOrigin::Markup {
                target: target.to_string(),
            },
            kind,
            source,
        });
    }
    collected
}

fn classify_kind(script_type: Option<&str>) -> ScriptKind {
    match script_type.map(|value| value.trim().to_ascii_lowercase()) {
        None => ScriptKind::Classic,
        Some(lowered) => match lowered.as_str() {
            "" | "text/javascript" | "application/javascript" | "text/ecmascript"
            | "application/ecmascript" => ScriptKind::Classic,
            "module" => ScriptKind::Module,
            _ => ScriptKind::Unknown,
        },
    }
}

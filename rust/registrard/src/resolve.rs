use serde::Serialize;
use thiserror::Error;
use tracing::warn;

const COURSE_TOKEN_PREFIX: &str = "course-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub section_id: i64,
    pub course_id: i64,
    pub label: Option<String>,
}

/// What the caller picked when scheduling: an existing section, or a course
/// that still needs a section created for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionToken {
    Direct(i64),
    CreateUnderCourse(i64),
}

impl SelectionToken {
    /// Numbers and numeric strings name a section; `course-<id>` names a
    /// course. Anything else, including a non-positive course id, is rejected.
    pub fn parse(raw: &serde_json::Value) -> Result<Self, String> {
        match raw {
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Direct)
                .ok_or_else(|| "selection must be an integer section id".to_string()),
            serde_json::Value::String(s) => {
                let t = s.trim();
                if let Some(rest) = t.strip_prefix(COURSE_TOKEN_PREFIX) {
                    return match rest.parse::<i64>() {
                        Ok(course_id) if course_id > 0 => Ok(Self::CreateUnderCourse(course_id)),
                        _ => Err(format!("invalid course id in selection: {}", t)),
                    };
                }
                t.parse::<i64>()
                    .map(Self::Direct)
                    .map_err(|_| format!("unrecognized selection: {}", t))
            }
            _ => Err("selection must be a section id or course-<id>".to_string()),
        }
    }

    pub fn to_wire(self) -> serde_json::Value {
        match self {
            Self::Direct(id) => serde_json::Value::from(id),
            Self::CreateUnderCourse(id) => {
                serde_json::Value::String(format!("{}{}", COURSE_TOKEN_PREFIX, id))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("could not resolve or create a section for course {course_id}")]
    Unresolved { course_id: i64 },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Collaborator owning the sections. Reads and creation are independent,
/// non-transactional calls.
pub trait SectionStore {
    fn list_sections(&mut self) -> anyhow::Result<Vec<Section>>;

    /// `Ok(None)` means the row may exist but no identifier came back.
    fn create_section(&mut self, course_id: i64) -> anyhow::Result<Option<Section>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub section_id: i64,
    pub created: bool,
}

/// Turns a selection into a concrete section id.
///
/// When creation does not hand back an id, the new row is located by diffing
/// against a snapshot taken before the insert and, failing that, by taking the
/// highest section id under the course. Another writer inserting sections for
/// the same course between the two reads can make this pick the wrong row;
/// fixing that needs a transactional store.
pub fn resolve_section<S: SectionStore + ?Sized>(
    token: SelectionToken,
    store: &mut S,
) -> Result<Resolved, ResolutionError> {
    let course_id = match token {
        SelectionToken::Direct(section_id) => {
            return Ok(Resolved {
                section_id,
                created: false,
            })
        }
        SelectionToken::CreateUnderCourse(course_id) => course_id,
    };

    let before = store.list_sections()?;
    if let Some(section) = store.create_section(course_id)? {
        return Ok(Resolved {
            section_id: section.section_id,
            created: true,
        });
    }

    let after = store.list_sections()?;
    let mut added = after.iter().filter(|s| {
        s.course_id == course_id && !before.iter().any(|b| b.section_id == s.section_id)
    });
    match (added.next(), added.next()) {
        (Some(only), None) => {
            return Ok(Resolved {
                section_id: only.section_id,
                created: true,
            })
        }
        (Some(_), Some(_)) => {
            warn!(course_id, "several new sections appeared; falling back to highest id");
        }
        (None, _) => {
            warn!(course_id, "created section not visible in re-read; falling back to highest id");
        }
    }

    after
        .iter()
        .filter(|s| s.course_id == course_id)
        .map(|s| s.section_id)
        .max()
        .map(|section_id| Resolved {
            section_id,
            created: true,
        })
        .ok_or(ResolutionError::Unresolved { course_id })
}

//! Parsing of simulation routes into descriptors.
//!
//! Routes look like `/simulation/difficulty/medium/restatement?reset=1`. The
//! `reset` marker is edge-triggered: [`claim_reset_marker`] reads and strips it
//! in one step so a reload of the rewritten URL cannot apply it twice.

use thiserror::Error;
use url::Url;

use crate::model::{DescriptorError, ModeParams, SimulationDescriptor, SimulationId};

const RESET_PARAM: &str = "reset";
const CONTINUE_PARAM: &str = "continue";
const EXAM_PARAM: &str = "exam";
const PAGE_PARAM: &str = "page";
const LIMIT_PARAM: &str = "limit";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RouteError {
    #[error("not a simulation route: {0}")]
    UnknownPath(String),

    #[error("missing route segment: {0}")]
    MissingSegment(&'static str),

    #[error("invalid {name}: {raw}")]
    InvalidValue { name: &'static str, raw: String },

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// What the route points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Mode and parameters were fully spelled out in the path.
    Descriptor(SimulationDescriptor),
    /// Only the simulation id is known; the launch token (or the id layout)
    /// supplies the mode.
    Resume(SimulationId),
}

/// Everything the engine consumes from a route, parsed once at mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub target: RouteTarget,
    pub reset_requested: bool,
    pub continue_requested: bool,
    pub force_exam: bool,
}

fn is_truthy(value: &str) -> bool {
    !matches!(value, "0" | "false" | "no")
}

/// Remove the one-shot reset marker from `url`, returning whether it was set.
///
/// Other query parameters are preserved in order.
pub fn claim_reset_marker(url: &mut Url) -> bool {
    let mut claimed = false;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| {
            if key == RESET_PARAM {
                claimed |= is_truthy(&value);
                None
            } else {
                Some((key.into_owned(), value.into_owned()))
            }
        })
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    claimed
}

fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn parse_value<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, RouteError> {
    raw.parse().map_err(|_| RouteError::InvalidValue {
        name,
        raw: raw.to_owned(),
    })
}

/// Parse a simulation route, claiming the reset marker on the way.
///
/// `default_quick_limit` applies when a quick practice route has no `limit`.
///
/// # Errors
///
/// Returns `RouteError` for paths outside `/simulation/...`, missing or
/// malformed segments, and invalid descriptors.
pub fn parse_route(url: &mut Url, default_quick_limit: u32) -> Result<LaunchRequest, RouteError> {
    let reset_requested = claim_reset_marker(url);
    let continue_requested = query_value(url, CONTINUE_PARAM).is_some_and(|v| is_truthy(&v));
    let force_exam = query_value(url, EXAM_PARAM).is_some_and(|v| is_truthy(&v));

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let unknown = || RouteError::UnknownPath(url.path().to_owned());
    let (root, rest) = segments.split_first().ok_or_else(unknown)?;
    if *root != "simulation" {
        return Err(unknown());
    }
    let (mode, args) = rest.split_first().ok_or_else(unknown)?;
    let arg = |i: usize, name: &'static str| -> Result<&str, RouteError> {
        args.get(i).copied().ok_or(RouteError::MissingSegment(name))
    };

    let params = match *mode {
        "resume" => {
            let id = SimulationId::from_persisted(arg(0, "simulation id")?);
            return Ok(LaunchRequest {
                target: RouteTarget::Resume(id),
                reset_requested,
                continue_requested,
                force_exam,
            });
        }
        "topic" => ModeParams::Topic {
            topic_id: parse_value("topic id", arg(0, "topic id")?)?,
        },
        "difficulty" => ModeParams::Difficulty {
            level: parse_value("difficulty", arg(0, "difficulty")?)?,
            kind: parse_value("question type", arg(1, "question type")?)?,
        },
        "story" => ModeParams::Story {
            story_id: parse_value("story id", arg(0, "story id")?)?,
        },
        "set" => ModeParams::QuestionSet {
            set_id: parse_value("set id", arg(0, "set id")?)?,
            page: query_value(url, PAGE_PARAM)
                .map(|raw| parse_value("page", &raw))
                .transpose()?
                .unwrap_or(0),
        },
        "quick" => ModeParams::QuickPractice {
            kind: parse_value("question type", arg(0, "question type")?)?,
            limit: query_value(url, LIMIT_PARAM)
                .map(|raw| parse_value("limit", &raw))
                .transpose()?
                .unwrap_or(default_quick_limit),
        },
        "exam" => ModeParams::FullExam,
        _ => return Err(unknown()),
    };

    Ok(LaunchRequest {
        target: RouteTarget::Descriptor(
            SimulationDescriptor::new(params)?.with_forced_exam_mode(force_exam),
        ),
        reset_requested,
        continue_requested,
        force_exam,
    })
}

/// Path (and mode query) that [`parse_route`] maps back to `descriptor`.
#[must_use]
pub fn route_path(descriptor: &SimulationDescriptor) -> String {
    let mut path = match descriptor.params() {
        ModeParams::Topic { topic_id } => format!("/simulation/topic/{topic_id}"),
        ModeParams::Difficulty { level, kind } => format!("/simulation/difficulty/{level}/{kind}"),
        ModeParams::Story { story_id } => format!("/simulation/story/{story_id}"),
        ModeParams::QuestionSet { set_id, page } => format!("/simulation/set/{set_id}?page={page}"),
        ModeParams::QuickPractice { kind, limit } => {
            format!("/simulation/quick/{kind}?limit={limit}")
        }
        ModeParams::FullExam => "/simulation/exam".to_owned(),
    };
    let forced = descriptor.exam_mode() && !matches!(descriptor.params(), ModeParams::FullExam);
    if forced {
        path.push(if path.contains('?') { '&' } else { '?' });
        path.push_str("exam=1");
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, QuestionType, SetId};

    fn url(s: &str) -> Url {
        Url::parse(&format!("https://exam.local{s}")).unwrap()
    }

    #[test]
    fn reset_marker_is_claimed_exactly_once() {
        let mut u = url("/simulation/exam?reset=1&continue=1");
        assert!(claim_reset_marker(&mut u));
        assert_eq!(u.query(), Some("continue=1"));
        assert!(!claim_reset_marker(&mut u));
    }

    #[test]
    fn stripping_last_param_drops_query() {
        let mut u = url("/simulation/exam?reset=true");
        assert!(claim_reset_marker(&mut u));
        assert_eq!(u.query(), None);
    }

    #[test]
    fn parses_difficulty_route() {
        let mut u = url("/simulation/difficulty/medium/sentence-completion?reset=1");
        let req = parse_route(&mut u, 10).unwrap();
        assert!(req.reset_requested);
        let RouteTarget::Descriptor(d) = req.target else {
            panic!("expected descriptor");
        };
        assert_eq!(
            d.params(),
            &ModeParams::Difficulty {
                level: Difficulty::Medium,
                kind: QuestionType::SentenceCompletion
            }
        );
        assert_eq!(u.query(), None);
    }

    #[test]
    fn set_route_defaults_to_first_page() {
        let mut u = url("/simulation/set/4");
        let req = parse_route(&mut u, 10).unwrap();
        assert_eq!(
            req.target,
            RouteTarget::Descriptor(
                SimulationDescriptor::new(ModeParams::QuestionSet {
                    set_id: SetId::new(4),
                    page: 0
                })
                .unwrap()
            )
        );
    }

    #[test]
    fn quick_route_uses_default_limit() {
        let mut u = url("/simulation/quick/restatement");
        let req = parse_route(&mut u, 12).unwrap();
        let RouteTarget::Descriptor(d) = req.target else {
            panic!("expected descriptor");
        };
        assert_eq!(d.simulation_id().as_str(), "quick_restatement_12");
    }

    #[test]
    fn resume_route_carries_only_the_id() {
        let mut u = url("/simulation/resume/story_9?continue=1");
        let req = parse_route(&mut u, 10).unwrap();
        assert!(req.continue_requested);
        assert_eq!(
            req.target,
            RouteTarget::Resume(SimulationId::from_persisted("story_9"))
        );
    }

    #[test]
    fn rejects_foreign_paths_and_bad_segments() {
        assert!(matches!(
            parse_route(&mut url("/pricing"), 10),
            Err(RouteError::UnknownPath(_))
        ));
        assert!(matches!(
            parse_route(&mut url("/simulation/topic/abc"), 10),
            Err(RouteError::InvalidValue { .. })
        ));
        assert_eq!(
            parse_route(&mut url("/simulation/difficulty/hard"), 10).unwrap_err(),
            RouteError::MissingSegment("question type")
        );
    }

    #[test]
    fn route_path_round_trips_forced_exam() {
        let descriptor = SimulationDescriptor::new(ModeParams::QuestionSet {
            set_id: SetId::new(2),
            page: 3,
        })
        .unwrap()
        .with_forced_exam_mode(true);
        let mut u = url(&route_path(&descriptor));
        let req = parse_route(&mut u, 10).unwrap();
        assert_eq!(req.target, RouteTarget::Descriptor(descriptor));
    }
}

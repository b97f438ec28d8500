use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// What a scorer process is bound to. Two kinds are compatible only if equal,
/// so a tagger started with one threshold is not reused for another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScorerKind {
    Tagger { threshold: f32 },
    GeneralRater,
    AnimeRater,
}

impl ScorerKind {
    pub fn label(&self) -> &'static str {
        match self {
            ScorerKind::Tagger { .. } => "tagger",
            ScorerKind::GeneralRater => "general-rater",
            ScorerKind::AnimeRater => "anime-rater",
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorerKind::Tagger { threshold } => write!(f, "tagger(threshold={})", threshold),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ScorerCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScorerSettings {
    pub tagger: ScorerCommand,
    pub general_rater: ScorerCommand,
    pub anime_rater: ScorerCommand,
    /// Substring of the diagnostic line announcing readiness.
    pub ready_marker: String,
    pub ready_timeout: Duration,
    pub request_timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self {
            tagger: ScorerCommand::new("python", ["autotag.py"]),
            general_rater: ScorerCommand::new("python", ["aesthetic_rater_general.py"]),
            anime_rater: ScorerCommand::new("python", ["aesthetic_rater_anime.py"]),
            ready_marker: "initialized and ready".to_string(),
            ready_timeout: Duration::from_secs(600),
            request_timeout: Duration::from_secs(120),
            working_dir: None,
        }
    }
}

impl ScorerSettings {
    /// Command line for `kind`; the tagger gets its threshold appended.
    pub fn command_for(&self, kind: ScorerKind) -> ScorerCommand {
        match kind {
            ScorerKind::Tagger { threshold } => {
                let mut cmd = self.tagger.clone();
                cmd.args.push(threshold.to_string());
                cmd
            }
            ScorerKind::GeneralRater => self.general_rater.clone(),
            ScorerKind::AnimeRater => self.anime_rater.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagger_threshold_is_last_argument() {
        let settings = ScorerSettings::default();
        let cmd = settings.command_for(ScorerKind::Tagger { threshold: 0.35 });
        assert_eq!(cmd.program, "python");
        assert_eq!(cmd.args, vec!["autotag.py", "0.35"]);
        assert_eq!(
            settings.command_for(ScorerKind::AnimeRater).args,
            vec!["aesthetic_rater_anime.py"]
        );
    }

    #[test]
    fn kinds_differ_by_threshold() {
        assert_ne!(
            ScorerKind::Tagger { threshold: 0.3 },
            ScorerKind::Tagger { threshold: 0.5 }
        );
        assert_eq!(ScorerKind::GeneralRater, ScorerKind::GeneralRater);
    }
}

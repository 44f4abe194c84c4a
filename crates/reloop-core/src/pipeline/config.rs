use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How captured values reach the extracted loop body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapturePassing {
    /// The extracted procedure itself takes the opaque capture handle and
    /// unpacks it at the top of its entry block. One new function per loop.
    #[default]
    SelfConverting,
    /// The extracted procedure takes one typed parameter per capture; a
    /// separate adapter function unpacks the handle and forwards. Two new
    /// functions per loop.
    Adapter,
}

impl FromStr for CapturePassing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "self-converting" => Ok(CapturePassing::SelfConverting),
            "adapter" => Ok(CapturePassing::Adapter),
            other => Err(format!(
                "unknown capture-passing convention `{other}` (expected `self-converting` or `adapter`)"
            )),
        }
    }
}

/// Configuration for debug dumps during the pipeline.
#[derive(Debug, Clone, Default)]
pub struct DebugConfig {
    /// Filter dumps to functions whose name matches this string
    /// (substring, then case-insensitive substring).
    pub function_filter: Option<String>,
    /// Stop the transform pipeline after the named pass, dump IR, then
    /// return without finishing. The special value `"input"` dumps the
    /// module before any transforms run.
    pub dump_ir_after: Option<String>,
}

impl DebugConfig {
    /// A config with all dumps disabled.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` if no filter is set, or the function name contains the
    /// filter (exact first, then case-insensitively).
    pub fn should_dump(&self, func_name: &str) -> bool {
        let Some(filter) = self.function_filter.as_deref() else {
            return true;
        };
        if func_name.contains(filter) {
            return true;
        }
        func_name.to_lowercase().contains(&filter.to_lowercase())
    }
}

/// Configuration for which transform passes to run.
///
/// All passes are enabled by default. Disable individual passes by setting
/// their fields to `false`, or use `from_skip_list` with pass name strings.
#[derive(Debug, Clone)]
pub struct PassConfig {
    pub value_namer: bool,
    /// Give every loop a dedicated preheader. `loop-extract` requires it.
    pub loop_simplify: bool,
    /// Demote loop-carried block params and loop live-outs to memory.
    /// `loop-extract` requires it.
    pub loop_demote: bool,
    pub loop_extract: bool,
    /// Calling convention used by `loop-extract`.
    pub capture_passing: CapturePassing,
    /// When enabled, the pipeline repeats all passes until none report
    /// changes.
    pub fixpoint: bool,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            value_namer: true,
            loop_simplify: true,
            loop_demote: true,
            loop_extract: true,
            capture_passing: CapturePassing::default(),
            fixpoint: false,
        }
    }
}

impl PassConfig {
    /// Create a config with all passes enabled except those in the skip
    /// list. Unknown names are ignored.
    ///
    /// Pass names correspond to `Transform::name()` values:
    /// - `"value-namer"`
    /// - `"loop-simplify"`
    /// - `"loop-demote"`
    /// - `"loop-extract"`
    /// - `"fixpoint"` — toggles pipeline fixpoint iteration
    pub fn from_skip_list(skip: &[&str]) -> Self {
        let mut config = Self::default();
        for name in skip {
            match *name {
                "value-namer" => config.value_namer = false,
                "loop-simplify" => config.loop_simplify = false,
                "loop-demote" => config.loop_demote = false,
                "loop-extract" => config.loop_extract = false,
                "fixpoint" => config.fixpoint = false,
                _ => {}
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_enables_all() {
        let config = PassConfig::default();
        assert!(config.value_namer);
        assert!(config.loop_simplify);
        assert!(config.loop_demote);
        assert!(config.loop_extract);
        assert!(!config.fixpoint);
        assert_eq!(config.capture_passing, CapturePassing::SelfConverting);
    }

    #[test]
    fn skip_list_disables_passes() {
        let config = PassConfig::from_skip_list(&["loop-demote", "value-namer"]);
        assert!(!config.loop_demote);
        assert!(!config.value_namer);
        assert!(config.loop_simplify);
        assert!(config.loop_extract);
    }

    #[test]
    fn skip_list_unknown_ignored() {
        let config = PassConfig::from_skip_list(&["nonexistent"]);
        assert!(config.loop_extract);
    }

    #[test]
    fn capture_passing_parses() {
        assert_eq!(
            "adapter".parse::<CapturePassing>().unwrap(),
            CapturePassing::Adapter
        );
        assert_eq!(
            "self-converting".parse::<CapturePassing>().unwrap(),
            CapturePassing::SelfConverting
        );
        assert!("direct".parse::<CapturePassing>().is_err());
    }

    fn debug_with_filter(filter: &str) -> DebugConfig {
        DebugConfig {
            function_filter: Some(filter.to_string()),
            dump_ir_after: None,
        }
    }

    #[test]
    fn should_dump_no_filter() {
        assert!(DebugConfig::none().should_dump("anything"));
    }

    #[test]
    fn should_dump_exact_substring() {
        let cfg = debug_with_filter("step");
        assert!(cfg.should_dump("event_step_2"));
        assert!(!cfg.should_dump("event_draw_0"));
    }

    #[test]
    fn should_dump_case_insensitive_substring() {
        let cfg = debug_with_filter("STEP");
        assert!(cfg.should_dump("event_step_2"));
        assert!(!cfg.should_dump("event_draw_0"));
    }
}

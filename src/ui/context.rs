//! Interactive vs plain output detection

use std::io::IsTerminal;

/// Variables whose presence means nobody is watching the terminal
const NON_INTERACTIVE_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "JENKINS_URL",
    // Set for every action run by the build orchestrator
    "BUCK_SCRATCH_PATH",
    // Explicit opt-out
    "BOS_ARTIFACTS_PLAIN",
];

/// Decides between cliclack/indicatif output and plain lines
#[derive(Debug, Clone)]
pub struct UiContext {
    interactive: bool,
    /// `--yes`: prompts answer themselves
    auto_yes: bool,
}

impl UiContext {
    /// Detect from the terminal and the process environment
    pub fn detect() -> Self {
        let tty = std::io::stdout().is_terminal() && std::io::stdin().is_terminal();
        Self {
            interactive: tty && !headless(|key| std::env::var_os(key).is_some()),
            auto_yes: false,
        }
    }

    /// Plain output, no prompts
    pub fn non_interactive() -> Self {
        Self {
            interactive: false,
            auto_yes: false,
        }
    }

    pub fn with_auto_yes(mut self, yes: bool) -> Self {
        self.auto_yes = yes;
        self
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn auto_yes(&self) -> bool {
        self.auto_yes
    }

    /// Spinners, bars and cliclack log lines
    pub fn use_fancy_output(&self) -> bool {
        self.interactive
    }
}

fn headless<F>(is_set: F) -> bool
where
    F: Fn(&str) -> bool,
{
    NON_INTERACTIVE_VARS.iter().any(|var| is_set(var))
}

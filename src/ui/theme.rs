//! cliclack theme

use cliclack::ThemeState;
use console::Style;

/// Blue while a prompt is open, green once answered
#[derive(Debug, Clone, Default)]
pub struct ArtifactTheme;

/// Shared by bars and symbols; only the submitted state differs
fn palette(state: &ThemeState, submitted: Style) -> Style {
    match state {
        ThemeState::Active => Style::new().blue(),
        ThemeState::Error(_) => Style::new().red(),
        ThemeState::Cancel => Style::new().dim(),
        ThemeState::Submit => submitted,
    }
}

impl cliclack::Theme for ArtifactTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        palette(state, Style::new().blue().dim())
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        palette(state, Style::new().green())
    }
}

pub fn init_theme() {
    cliclack::set_theme(ArtifactTheme);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submitted_state_differs() {
        let render = |style: Style| style.force_styling(true).apply_to("x").to_string();
        let bar = palette(&ThemeState::Submit, Style::new().blue().dim());
        let symbol = palette(&ThemeState::Submit, Style::new().green());
        assert_ne!(render(bar), render(symbol));
    }
}

use crate::{
    error::ParseErrorKind, MacroAction, MacroError, MacroItem, MouseButton, Point, Result,
};
use std::{fmt, fs, path::Path};
use tracing::{debug, info};

const TARGET_KEYWORD: &str = "Target";

/// An ordered list of macro items bound to one target window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSequence {
    target_window: String,
    items: Vec<MacroItem>,
}

impl MacroSequence {
    /// Create an empty sequence. Fails when `target_window` is empty or cannot
    /// be written on a `Target` line (contains a quote or a line break).
    pub fn new(target_window: impl Into<String>) -> Result<Self> {
        let target_window = target_window.into();
        if target_window.is_empty() {
            return Err(MacroError::ConfigurationError(
                "a macro sequence needs a target window".to_string(),
            ));
        }
        if target_window.contains(['"', '\r', '\n']) {
            return Err(MacroError::ConfigurationError(format!(
                "window title {:?} cannot be stored in a macro file",
                target_window
            )));
        }
        Ok(Self {
            target_window,
            items: Vec::new(),
        })
    }

    pub fn target_window(&self) -> &str {
        &self.target_window
    }

    /// Append an item. The item's window is not checked against the sequence's.
    pub fn add_item(&mut self, item: MacroItem) {
        self.items.push(item);
    }

    pub fn remove_item(&mut self, index: usize) -> Option<MacroItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MacroItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[MacroItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MacroItem> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, MacroItem> {
        self.items.iter_mut()
    }

    /// Load a macro file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MacroError::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let sequence = Self::parse(&text)?;
        info!(
            "Loaded {} macro items targeting \"{}\" from {:?}",
            sequence.len(),
            sequence.target_window,
            path
        );
        Ok(sequence)
    }

    /// Parse macro text.
    ///
    /// The `Target` line may appear anywhere; all other non-blank, non-comment
    /// lines are items, kept in file order.
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(index, line)| (index + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .collect();

        let mut target_line = None;
        for (number, line) in &lines {
            if !is_target_line(line) {
                continue;
            }
            if let Some(first) = target_line {
                return Err(MacroError::ConfigurationError(format!(
                    "duplicate Target line on line {} (first on line {})",
                    number, first
                )));
            }
            target_line = Some(*number);
        }

        let target_number = target_line.ok_or_else(|| {
            MacroError::ConfigurationError("macro file has no Target line".to_string())
        })?;
        let target = lines
            .iter()
            .find(|(number, _)| *number == target_number)
            .and_then(|(_, line)| quoted_value(line))
            .ok_or_else(|| {
                MacroError::ConfigurationError(format!(
                    "Target line {} has no quoted window title",
                    target_number
                ))
            })?;

        let mut sequence = Self::new(target)?;
        for (number, line) in lines {
            if number == target_number {
                continue;
            }
            let item = parse_item(&sequence.target_window, line)
                .map_err(|kind| MacroError::ParseError { line: number, kind })?;
            sequence.add_item(item);
        }

        debug!("Parsed {} items for \"{}\"", sequence.len(), sequence.target_window);
        Ok(sequence)
    }

    /// The exact text `save_to_file` writes
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Write the sequence as a macro file, replacing any existing file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if self.target_window.is_empty() {
            return Err(MacroError::ConfigurationError(
                "cannot save a macro sequence without a target window".to_string(),
            ));
        }
        for (index, item) in self.items.iter().enumerate() {
            if let Some(key) = item.key_name() {
                if key.is_empty() || key.contains(char::is_whitespace) {
                    return Err(MacroError::ConfigurationError(format!(
                        "item {} has key name {:?}, which cannot be stored in a macro file",
                        index + 1,
                        key
                    )));
                }
            }
        }
        info!("Saving {} macro items to {:?}", self.len(), path.as_ref());
        fs::write(path, self.to_text())?;
        Ok(())
    }
}

impl fmt::Display for MacroSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} \"{}\"", TARGET_KEYWORD, self.target_window)?;
        for item in &self.items {
            writeln!(f, "{}", item)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a MacroSequence {
    type Item = &'a MacroItem;
    type IntoIter = std::slice::Iter<'a, MacroItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

fn is_target_line(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|token| token.eq_ignore_ascii_case(TARGET_KEYWORD))
}

/// First double-quoted substring of the line, if it is non-empty
fn quoted_value(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    Some(&line[start..start + len]).filter(|value| !value.is_empty())
}

fn invalid(action: MacroAction, reason: impl Into<String>) -> ParseErrorKind {
    ParseErrorKind::InvalidParameters {
        action,
        reason: reason.into(),
    }
}

fn parse_item(window: &str, line: &str) -> std::result::Result<MacroItem, ParseErrorKind> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let action: MacroAction = verb
        .parse()
        .map_err(|_| ParseErrorKind::UnsupportedAction(verb.to_string()))?;
    let params: Vec<&str> = parts.collect();

    let expected = match action {
        MacroAction::PressButton | MacroAction::ReleaseButton => 3,
        _ => 1,
    };
    if params.len() != expected {
        return Err(invalid(
            action,
            format!("expected {} parameter(s), found {}", expected, params.len()),
        ));
    }

    let item = match action {
        MacroAction::SendKey => MacroItem::send_key(window, params[0]),
        MacroAction::PressKey => MacroItem::press_key(window, params[0]),
        MacroAction::ReleaseKey => MacroItem::release_key(window, params[0]),
        MacroAction::Wait => {
            let milliseconds = params[0]
                .parse::<u64>()
                .map_err(|_| invalid(action, format!("'{}' is not a millisecond count", params[0])))?;
            MacroItem::wait(milliseconds)
        }
        MacroAction::PressButton | MacroAction::ReleaseButton => {
            let button: MouseButton = params[0].parse().map_err(|e: String| invalid(action, e))?;
            let coordinate = |text: &str| {
                text.parse::<i32>()
                    .map_err(|_| invalid(action, format!("'{}' is not an integer coordinate", text)))
            };
            let point = Point::new(coordinate(params[1])?, coordinate(params[2])?);
            if action == MacroAction::PressButton {
                MacroItem::press_button(window, button, point)
            } else {
                MacroItem::release_button(window, button, point)
            }
        }
    };
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemKind;

    #[test]
    fn test_sequence_requires_target_window() {
        assert!(matches!(
            MacroSequence::new(""),
            Err(MacroError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_parse_reads_items_in_order() {
        let text = "# warm-up\nTarget \"Untitled - Notepad\"\n\nSendKey enter\n  wait 20  \npressbutton left 5 6\nReleaseButton RIGHT -1 2\n";
        let sequence = MacroSequence::parse(text).unwrap();

        assert_eq!(sequence.target_window(), "Untitled - Notepad");
        let lines: Vec<String> = sequence.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "SendKey enter",
                "Wait 20",
                "PressButton Left 5 6",
                "ReleaseButton Right -1 2",
            ]
        );
        assert!(sequence
            .iter()
            .all(|item| item.target_window().map_or(true, |w| w == "Untitled - Notepad")));
    }

    #[test]
    fn test_target_line_position_does_not_matter() {
        let sequence = MacroSequence::parse("PressKey A\ntarget \"Calc\"\nReleaseKey A\n").unwrap();
        assert_eq!(sequence.target_window(), "Calc");
        assert_eq!(sequence.len(), 2);
    }

    #[test]
    fn test_missing_or_empty_target_is_a_configuration_error() {
        for text in ["PressKey A\n", "Target Notepad\nPressKey A\n", "Target \"\"\n", "# Target \"x\"\n"] {
            assert!(
                matches!(MacroSequence::parse(text), Err(MacroError::ConfigurationError(_))),
                "expected configuration error for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_duplicate_target_is_rejected() {
        let result = MacroSequence::parse("Target \"A\"\nTarget \"B\"\n");
        assert!(matches!(result, Err(MacroError::ConfigurationError(_))));
    }

    #[test]
    fn test_unknown_action_reports_line() {
        let result = MacroSequence::parse("Target \"Notepad\"\n\nFly up\n");
        match result {
            Err(MacroError::ParseError { line, kind }) => {
                assert_eq!(line, 3);
                assert_eq!(kind, ParseErrorKind::UnsupportedAction("Fly".to_string()));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_parameters() {
        let cases = [
            ("Wait abc", MacroAction::Wait),
            ("Wait -5", MacroAction::Wait),
            ("Wait", MacroAction::Wait),
            ("PressKey", MacroAction::PressKey),
            ("SendKey a b", MacroAction::SendKey),
            ("PressButton Left 1", MacroAction::PressButton),
            ("PressButton Middle 1 2", MacroAction::PressButton),
            ("ReleaseButton Left x 2", MacroAction::ReleaseButton),
            ("ReleaseButton Left 1 2 3", MacroAction::ReleaseButton),
        ];
        for (line, expected) in cases {
            let text = format!("Target \"Notepad\"\n{}\n", line);
            match MacroSequence::parse(&text) {
                Err(MacroError::ParseError {
                    line: 2,
                    kind: ParseErrorKind::InvalidParameters { action, .. },
                }) => assert_eq!(action, expected, "line {:?}", line),
                other => panic!("expected invalid parameters for {:?}, got {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_unknown_key_names_still_load() {
        let sequence = MacroSequence::parse("Target \"Notepad\"\nPressKey hyper\n").unwrap();
        match sequence.get(0).map(|i| i.kind()) {
            Some(ItemKind::PressKey(target)) => assert!(!target.code.is_resolved()),
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn test_text_starts_with_target_line() {
        let mut sequence = MacroSequence::new("Notepad").unwrap();
        sequence.add_item(MacroItem::press_key("Notepad", "A"));
        sequence.add_item(MacroItem::wait(100));
        assert_eq!(sequence.to_text(), "Target \"Notepad\"\nPressKey A\nWait 100\n");
    }

    #[test]
    fn test_unstorable_titles_are_rejected() {
        for title in ["Say \"hi\" - Notepad", "two\nlines", "carriage\r"] {
            assert!(
                matches!(MacroSequence::new(title), Err(MacroError::ConfigurationError(_))),
                "expected configuration error for {:?}",
                title
            );
        }
    }

    #[test]
    fn test_save_rejects_unstorable_key_names() {
        let dir = tempfile::tempdir().unwrap();
        for key in ["page up", "", "a\tb"] {
            let path = dir.path().join("keys.macro");
            let mut sequence = MacroSequence::new("Notepad").unwrap();
            sequence.add_item(MacroItem::wait(10));
            sequence.add_item(MacroItem::press_key("Notepad", key));

            assert!(
                matches!(sequence.save_to_file(&path), Err(MacroError::ConfigurationError(_))),
                "expected configuration error for {:?}",
                key
            );
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_remove_and_clear() {
        let mut sequence = MacroSequence::new("Notepad").unwrap();
        sequence.add_item(MacroItem::wait(1));
        sequence.add_item(MacroItem::wait(2));

        assert_eq!(sequence.remove_item(5), None);
        assert_eq!(sequence.remove_item(0), Some(MacroItem::wait(1)));
        assert_eq!(sequence.len(), 1);
        sequence.clear();
        assert!(sequence.is_empty());
    }
}

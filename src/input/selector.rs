//! Device selection.
//!
//! Selectors answer with a three-valued [`Verdict`] so that independent
//! filters can be combined without each one having an opinion about every
//! device. Only [`Selector::matches`] collapses the result to a `bool`.

use crate::input::device::DeviceInfo;
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("Invalid filter pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Yes,
    No,
    Unknown,
}

#[derive(Debug, Clone)]
pub enum Selector {
    All,
    None,
    NameRegex(Regex),
    ExactPath(PathBuf),
    Negation(Box<Selector>),
    Combined(CombinedSelector),
}

impl Selector {
    /// Case-insensitive match against the device display name.
    pub fn name_regex(pattern: &str) -> Result<Self, SelectorError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| SelectorError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Selector::NameRegex(regex))
    }

    pub fn exact_path(path: impl Into<PathBuf>) -> Self {
        Selector::ExactPath(path.into())
    }

    pub fn negate(inner: Selector) -> Self {
        Selector::Negation(Box::new(inner))
    }

    /// Parses a single user filter. A leading `!` negates, an absolute path
    /// selects one device node, anything else is a name pattern.
    pub fn parse(filter: &str) -> Result<Self, SelectorError> {
        if let Some(rest) = filter.strip_prefix('!') {
            return Ok(Selector::negate(Selector::parse(rest)?));
        }
        if Path::new(filter).is_absolute() {
            return Ok(Selector::exact_path(filter));
        }
        Selector::name_regex(filter)
    }

    /// Builds the combined selector for a list of user filters. No filters
    /// yields an empty combination, which accepts everything.
    pub fn from_filters<I, S>(filters: I) -> Result<Self, SelectorError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut combined = CombinedSelector::new();
        for filter in filters {
            combined.add(Selector::parse(filter.as_ref())?);
        }
        Ok(Selector::Combined(combined))
    }

    /// Whether this selector adds devices to the selection (as opposed to
    /// removing already selected ones).
    pub fn is_positive(&self) -> bool {
        match self {
            Selector::All => true,
            Selector::None => false,
            Selector::NameRegex(_) | Selector::ExactPath(_) => true,
            Selector::Negation(inner) => !inner.is_positive(),
            Selector::Combined(_) => true,
        }
    }

    pub fn verdict(&self, device: &DeviceInfo) -> Verdict {
        match self {
            Selector::All => Verdict::Yes,
            Selector::None => Verdict::No,
            Selector::NameRegex(regex) => {
                if regex.is_match(&device.name) {
                    Verdict::Yes
                } else {
                    Verdict::Unknown
                }
            }
            Selector::ExactPath(path) => {
                if device.path == *path {
                    Verdict::Yes
                } else {
                    Verdict::Unknown
                }
            }
            Selector::Negation(inner) => match inner.verdict(device) {
                Verdict::Yes => Verdict::No,
                // A negative answer does not become a positive one.
                Verdict::No | Verdict::Unknown => Verdict::Unknown,
            },
            Selector::Combined(combined) => combined.verdict(device),
        }
    }

    /// Top-level decision; no opinion means the device is accepted.
    pub fn matches(&self, device: &DeviceInfo) -> bool {
        self.verdict(device) != Verdict::No
    }
}

#[derive(Debug, Clone)]
pub struct CombinedSelector {
    selectors: Vec<Selector>,
    default: Verdict,
}

impl Default for CombinedSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl CombinedSelector {
    pub fn new() -> Self {
        Self {
            selectors: Vec::new(),
            default: Verdict::Yes,
        }
    }

    pub fn add(&mut self, selector: Selector) -> &mut Self {
        // Any explicit inclusion switches the default to deny.
        if selector.is_positive() {
            self.default = Verdict::No;
        }
        self.selectors.push(selector);
        self
    }

    fn verdict(&self, device: &DeviceInfo) -> Verdict {
        let mut positive_matched = false;
        let mut negative_matched = false;

        for selector in &self.selectors {
            match (selector.is_positive(), selector.verdict(device)) {
                (true, Verdict::Yes) => positive_matched = true,
                (false, Verdict::No) => negative_matched = true,
                _ => {}
            }
        }

        if positive_matched {
            return if negative_matched { Verdict::No } else { Verdict::Yes };
        }
        if negative_matched {
            return Verdict::No;
        }
        self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(path: &str, name: &str) -> DeviceInfo {
        DeviceInfo::new(path, name)
    }

    fn combined(selectors: Vec<Selector>) -> Selector {
        let mut combined = CombinedSelector::new();
        for selector in selectors {
            combined.add(selector);
        }
        Selector::Combined(combined)
    }

    #[test]
    fn test_empty_filters_accept_everything() {
        let selector = Selector::from_filters(Vec::<String>::new()).unwrap();
        assert!(selector.matches(&device("/dev/input/event0", "Power Button")));
        assert!(selector.matches(&device("/dev/input/event7", "")));
    }

    #[test]
    fn test_only_negative_members_keep_accept_all_default() {
        let selector = Selector::from_filters(["!mouse", "!/dev/input/event3"]).unwrap();
        assert!(selector.matches(&device("/dev/input/event1", "AT Keyboard")));
        assert!(!selector.matches(&device("/dev/input/event2", "USB Mouse")));
        assert!(!selector.matches(&device("/dev/input/event3", "Lid Switch")));
    }

    #[test]
    fn test_positive_member_switches_default_to_deny() {
        let selector = Selector::from_filters(["keyboard"]).unwrap();
        assert!(!selector.matches(&device("/dev/input/event4", "Video Bus")));
        assert!(selector.matches(&device("/dev/input/event5", "USB KEYBOARD")));
    }

    #[test]
    fn test_keyboard_without_touch_example() {
        let selector = Selector::from_filters(["keyboard", "!touch"]).unwrap();
        assert!(selector.matches(&device("/dev/input/event1", "USB Keyboard")));
        assert!(!selector.matches(&device("/dev/input/event2", "Touchpad")));
        assert!(!selector.matches(&device("/dev/input/event3", "Keyboard Touch Sensor")));
    }

    #[test]
    fn test_exclusion_overrides_inclusion() {
        let dev = device("/dev/input/event9", "Gaming Mouse");
        let selector = combined(vec![
            Selector::exact_path("/dev/input/event9"),
            Selector::negate(Selector::name_regex("mouse").unwrap()),
        ]);
        assert_eq!(selector.verdict(&dev), Verdict::No);
        assert!(!selector.matches(&dev));
    }

    #[test]
    fn test_name_regex_never_excludes() {
        let selector = Selector::name_regex("^sleep").unwrap();
        assert_eq!(
            selector.verdict(&device("/dev/input/event0", "Sleep Button")),
            Verdict::Yes
        );
        assert_eq!(
            selector.verdict(&device("/dev/input/event0", "Power Button")),
            Verdict::Unknown
        );
    }

    #[test]
    fn test_exact_path_requires_equality() {
        let selector = Selector::exact_path("/dev/input/event1");
        assert_eq!(
            selector.verdict(&device("/dev/input/event1", "x")),
            Verdict::Yes
        );
        assert_eq!(
            selector.verdict(&device("/dev/input/event10", "x")),
            Verdict::Unknown
        );
    }

    #[test]
    fn test_negation_flips_only_definite_yes() {
        let yes = Selector::negate(Selector::All);
        let no = Selector::negate(Selector::None);
        let unknown = Selector::negate(Selector::exact_path("/nowhere"));
        let dev = device("/dev/input/event0", "anything");

        assert_eq!(yes.verdict(&dev), Verdict::No);
        assert_eq!(no.verdict(&dev), Verdict::Unknown);
        assert_eq!(unknown.verdict(&dev), Verdict::Unknown);
    }

    #[test]
    fn test_double_negation_on_definite_and_unknown() {
        let dev = device("/dev/input/event0", "anything");

        // Negation(Negation(None)) sees Unknown from the inner negation.
        let double_none = Selector::negate(Selector::negate(Selector::None));
        assert_eq!(double_none.verdict(&dev), Verdict::Unknown);

        let double_unknown = Selector::negate(Selector::negate(Selector::exact_path("/x")));
        assert_eq!(double_unknown.verdict(&dev), Verdict::Unknown);

        let double_all = Selector::negate(Selector::negate(Selector::All));
        assert_eq!(double_all.verdict(&dev), Verdict::Unknown);
        assert!(double_all.is_positive());
    }

    #[test]
    fn test_positivity_of_variants() {
        assert!(Selector::All.is_positive());
        assert!(!Selector::None.is_positive());
        assert!(Selector::exact_path("/dev/input/event0").is_positive());
        assert!(!Selector::negate(Selector::exact_path("/dev/input/event0")).is_positive());
        assert!(Selector::negate(Selector::None).is_positive());
        assert!(Selector::Combined(CombinedSelector::new()).is_positive());
    }

    #[test]
    fn test_none_member_excludes_everything() {
        let selector = combined(vec![Selector::All, Selector::None]);
        assert!(!selector.matches(&device("/dev/input/event0", "Keyboard")));
    }

    #[test]
    fn test_member_order_does_not_matter() {
        let a = Selector::from_filters(["!touch", "keyboard"]).unwrap();
        let b = Selector::from_filters(["keyboard", "!touch"]).unwrap();
        for name in ["USB Keyboard", "Touchpad", "Keyboard Touch Sensor", "Mouse"] {
            let dev = device("/dev/input/event1", name);
            assert_eq!(a.verdict(&dev), b.verdict(&dev), "{name}");
        }
    }

    #[test]
    fn test_parse_variants() {
        assert!(matches!(
            Selector::parse("/dev/input/event3").unwrap(),
            Selector::ExactPath(p) if p == Path::new("/dev/input/event3")
        ));
        assert!(matches!(
            Selector::parse("!/dev/input/event3").unwrap(),
            Selector::Negation(inner) if matches!(*inner, Selector::ExactPath(_))
        ));
        assert!(matches!(
            Selector::parse("logitech.*").unwrap(),
            Selector::NameRegex(_)
        ));
    }

    #[test]
    fn test_bad_pattern_fails_at_construction() {
        let err = Selector::from_filters(["keyboard", "(unclosed"]).unwrap_err();
        match err {
            SelectorError::Pattern { pattern, .. } => assert_eq!(pattern, "(unclosed"),
        }
    }

    #[test]
    fn test_selector_is_shareable_across_threads() {
        let selector = std::sync::Arc::new(Selector::from_filters(["mouse"]).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let selector = selector.clone();
                std::thread::spawn(move || {
                    selector.matches(&device(&format!("/dev/input/event{i}"), "USB Mouse"))
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}

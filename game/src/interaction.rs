use crate::round::EntityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionEvent {
    /// Restore `previous` to its default look and highlight `current`.
    FocusChanged {
        previous: Option<EntityId>,
        current: Option<EntityId>,
    },
    Selected(EntityId),
}

/// Turns per-frame hit-test candidates into focus changes and cut selections.
///
/// Only the previously focused entity is remembered; visuals belong to the caller.
#[derive(Debug, Clone, Default)]
pub struct InteractionResolver {
    focused: Option<EntityId>,
}

impl InteractionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused(&self) -> Option<&EntityId> {
        self.focused.as_ref()
    }

    /// `candidates` are front-to-back and already limited to interactable entities.
    pub fn update(&mut self, candidates: &[EntityId]) -> Option<InteractionEvent> {
        let next = candidates.first();
        if self.focused.as_ref() == next {
            return None;
        }
        let previous = self.focused.take();
        self.focused = next.cloned();
        Some(InteractionEvent::FocusChanged {
            previous,
            current: self.focused.clone(),
        })
    }

    /// A select signal. Cutting consumes the focus, so repeats are no-ops until
    /// something new is focused.
    pub fn select<F>(&mut self, is_cuttable: F) -> Option<InteractionEvent>
    where
        F: Fn(&EntityId) -> bool,
    {
        let focused = self.focused.as_ref()?;
        if !is_cuttable(focused) {
            return None;
        }
        self.focused.take().map(InteractionEvent::Selected)
    }

    pub fn clear(&mut self) -> Option<InteractionEvent> {
        self.update(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(labels: &[&str]) -> Vec<EntityId> {
        labels.iter().map(|l| EntityId::from(*l)).collect()
    }

    #[test]
    fn first_candidate_takes_focus() {
        let mut r = InteractionResolver::new();
        let event = r.update(&ids(&["blue", "red"]));
        assert_eq!(
            event,
            Some(InteractionEvent::FocusChanged {
                previous: None,
                current: Some("blue".into()),
            })
        );
        assert_eq!(r.focused(), Some(&EntityId::from("blue")));
    }

    #[test]
    fn unchanged_focus_emits_nothing() {
        let mut r = InteractionResolver::new();
        r.update(&ids(&["red"]));
        assert_eq!(r.update(&ids(&["red", "blue"])), None);
    }

    #[test]
    fn focus_moves_and_clears() {
        let mut r = InteractionResolver::new();
        r.update(&ids(&["red"]));
        assert_eq!(
            r.update(&ids(&["green"])),
            Some(InteractionEvent::FocusChanged {
                previous: Some("red".into()),
                current: Some("green".into()),
            })
        );
        assert_eq!(
            r.update(&[]),
            Some(InteractionEvent::FocusChanged {
                previous: Some("green".into()),
                current: None,
            })
        );
        assert_eq!(r.update(&[]), None);
    }

    #[test]
    fn select_fires_once_per_focus() {
        let mut r = InteractionResolver::new();
        r.update(&ids(&["red"]));
        assert_eq!(
            r.select(|_| true),
            Some(InteractionEvent::Selected("red".into()))
        );
        assert_eq!(r.select(|_| true), None);
        assert_eq!(r.focused(), None);
    }

    #[test]
    fn select_without_focus_or_counterpart_is_ignored() {
        let mut r = InteractionResolver::new();
        assert_eq!(r.select(|_| true), None);

        r.update(&ids(&["red"]));
        assert_eq!(r.select(|_| false), None);
        assert_eq!(r.focused(), Some(&EntityId::from("red")));
    }
}

//! Page access for the content script.
//!
//! Everything the content script needs from the LinkedIn page goes through
//! [`PageDom`]. On `wasm32` it is backed by `web-sys`; in tests it is a small
//! in-memory tree.

use thiserror::Error;

/// Id of the injected button. Its presence in the page marks injection as
/// already done.
pub const BUTTON_ID: &str = "rolodink-add-button";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("dom error: {0}")]
pub struct DomError(pub String);

/// Visual state of the injected button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    /// Enabled, offers to save the profile.
    Add,
    /// Request in flight.
    Saving,
    /// The profile is already stored for the signed-in user.
    Added,
}

impl ButtonState {
    pub fn label(self) -> &'static str {
        match self {
            ButtonState::Add => "Add to Rolodink",
            ButtonState::Saving => "Adding…",
            ButtonState::Added => "✓ In Rolodink",
        }
    }

    pub fn disabled(self) -> bool {
        !matches!(self, ButtonState::Add)
    }
}

/// Capability over the current document.
///
/// Queries return `None` on no match and never fail; mutations report a
/// [`DomError`] so callers can try the next insertion point.
pub trait PageDom {
    type Element: Clone;

    fn query_selector(&self, selector: &str) -> Option<Self::Element>;

    fn element_by_id(&self, id: &str) -> Option<Self::Element>;

    fn parent(&self, element: &Self::Element) -> Option<Self::Element>;

    fn text_content(&self, element: &Self::Element) -> Option<String>;

    /// Creates a detached `<button>` with the given id in the [`ButtonState::Add`] state.
    fn create_button(&self, id: &str) -> Result<Self::Element, DomError>;

    /// Inserts `node` as the next sibling of `anchor`.
    fn insert_after(&self, anchor: &Self::Element, node: &Self::Element) -> Result<(), DomError>;

    fn append_child(&self, parent: &Self::Element, node: &Self::Element) -> Result<(), DomError>;

    fn set_button_state(&self, button: &Self::Element, state: ButtonState);

    fn title(&self) -> String;

    fn location_href(&self) -> String;

    fn has_body(&self) -> bool;

    /// Blocking user-facing message.
    fn alert(&self, message: &str);

    /// Blocking text input. `None` when dismissed.
    fn prompt(&self, message: &str) -> Option<String>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Arena-backed document used by the native tests.

    use std::cell::{Cell, RefCell};

    use super::{ButtonState, DomError, PageDom};

    #[derive(Debug, Clone)]
    pub struct Node {
        pub tag: String,
        pub id: Option<String>,
        pub selectors: Vec<String>,
        pub text: String,
        pub parent: Option<usize>,
        pub children: Vec<usize>,
        pub button_state: Option<ButtonState>,
    }

    #[derive(Default)]
    pub struct FakeDom {
        pub nodes: RefCell<Vec<Node>>,
        pub title: RefCell<String>,
        pub href: RefCell<String>,
        pub body: Cell<bool>,
        pub alerts: RefCell<Vec<String>>,
        pub mutations: Cell<usize>,
        pub queries: Cell<usize>,
        /// When set, `insert_after` fails.
        pub reject_insert_after: Cell<bool>,
        pub prompts: RefCell<Vec<String>>,
        /// What the user types into every prompt.
        pub prompt_answer: RefCell<Option<String>>,
    }

    impl FakeDom {
        pub fn new(href: &str, title: &str) -> Self {
            let dom = FakeDom {
                title: RefCell::new(title.to_string()),
                href: RefCell::new(href.to_string()),
                body: Cell::new(true),
                ..FakeDom::default()
            };
            dom.nodes.borrow_mut().push(Node {
                tag: "main".to_string(),
                id: None,
                selectors: Vec::new(),
                text: String::new(),
                parent: None,
                children: Vec::new(),
                button_state: None,
            });
            dom
        }

        /// Adds a node under `parent` (the root `main` when `None`) matching
        /// its tag and the given selectors.
        pub fn add(&self, parent: Option<usize>, tag: &str, selectors: &[&str], text: &str) -> usize {
            let mut nodes = self.nodes.borrow_mut();
            let index = nodes.len();
            let parent = parent.unwrap_or(0);
            nodes.push(Node {
                tag: tag.to_string(),
                id: None,
                selectors: selectors.iter().map(|s| s.to_string()).collect(),
                text: text.to_string(),
                parent: Some(parent),
                children: Vec::new(),
                button_state: None,
            });
            nodes[parent].children.push(index);
            index
        }

        pub fn detach(&self, index: usize) {
            let mut nodes = self.nodes.borrow_mut();
            if let Some(parent) = nodes[index].parent.take() {
                nodes[parent].children.retain(|child| *child != index);
            }
        }

        pub fn button_state(&self, index: usize) -> Option<ButtonState> {
            self.nodes.borrow()[index].button_state
        }

        pub fn children_of(&self, index: usize) -> Vec<usize> {
            self.nodes.borrow()[index].children.clone()
        }

        fn attached(&self, index: usize) -> bool {
            let nodes = self.nodes.borrow();
            let mut current = index;
            loop {
                if current == 0 {
                    return true;
                }
                match nodes[current].parent {
                    Some(parent) => current = parent,
                    None => return false,
                }
            }
        }
    }

    impl PageDom for FakeDom {
        type Element = usize;

        fn query_selector(&self, selector: &str) -> Option<usize> {
            self.queries.set(self.queries.get() + 1);
            let count = self.nodes.borrow().len();
            (0..count).find(|index| {
                let nodes = self.nodes.borrow();
                let node = &nodes[*index];
                // Bare tag selectors match by tag name.
                self.attached(*index)
                    && (node.tag == selector || node.selectors.iter().any(|s| s == selector))
            })
        }

        fn element_by_id(&self, id: &str) -> Option<usize> {
            let count = self.nodes.borrow().len();
            (0..count).find(|index| {
                self.attached(*index) && self.nodes.borrow()[*index].id.as_deref() == Some(id)
            })
        }

        fn parent(&self, element: &usize) -> Option<usize> {
            self.nodes.borrow()[*element].parent
        }

        fn text_content(&self, element: &usize) -> Option<String> {
            Some(self.nodes.borrow()[*element].text.clone())
        }

        fn create_button(&self, id: &str) -> Result<usize, DomError> {
            let mut nodes = self.nodes.borrow_mut();
            nodes.push(Node {
                tag: "button".to_string(),
                id: Some(id.to_string()),
                selectors: Vec::new(),
                text: ButtonState::Add.label().to_string(),
                parent: None,
                children: Vec::new(),
                button_state: Some(ButtonState::Add),
            });
            Ok(nodes.len() - 1)
        }

        fn insert_after(&self, anchor: &usize, node: &usize) -> Result<(), DomError> {
            if self.reject_insert_after.get() {
                return Err(DomError("insert_after rejected".to_string()));
            }
            let mut nodes = self.nodes.borrow_mut();
            let parent = nodes[*anchor]
                .parent
                .ok_or_else(|| DomError("anchor is detached".to_string()))?;
            let position = nodes[parent]
                .children
                .iter()
                .position(|child| child == anchor)
                .ok_or_else(|| DomError("anchor not found in parent".to_string()))?;
            nodes[parent].children.insert(position + 1, *node);
            nodes[*node].parent = Some(parent);
            self.mutations.set(self.mutations.get() + 1);
            Ok(())
        }

        fn append_child(&self, parent: &usize, node: &usize) -> Result<(), DomError> {
            let mut nodes = self.nodes.borrow_mut();
            nodes[*parent].children.push(*node);
            nodes[*node].parent = Some(*parent);
            self.mutations.set(self.mutations.get() + 1);
            Ok(())
        }

        fn set_button_state(&self, button: &usize, state: ButtonState) {
            let mut nodes = self.nodes.borrow_mut();
            nodes[*button].button_state = Some(state);
            nodes[*button].text = state.label().to_string();
        }

        fn title(&self) -> String {
            self.title.borrow().clone()
        }

        fn location_href(&self) -> String {
            self.href.borrow().clone()
        }

        fn has_body(&self) -> bool {
            self.body.get()
        }

        fn alert(&self, message: &str) {
            self.alerts.borrow_mut().push(message.to_string());
        }

        fn prompt(&self, message: &str) -> Option<String> {
            self.prompts.borrow_mut().push(message.to_string());
            self.prompt_answer.borrow().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_states_match_labels() {
        assert_eq!(ButtonState::Add.label(), "Add to Rolodink");
        assert!(!ButtonState::Add.disabled());
        assert_eq!(ButtonState::Saving.label(), "Adding…");
        assert!(ButtonState::Saving.disabled());
        assert_eq!(ButtonState::Added.label(), "✓ In Rolodink");
        assert!(ButtonState::Added.disabled());
    }
}

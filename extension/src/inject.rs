//! Mounting the Rolodink button on a profile page and handling its clicks.

use std::rc::Rc;

use crate::anchor::locate_anchor;
use crate::client::{ApiClient, ClientError, CreateOutcome, NewConnection};
use crate::dom::{BUTTON_ID, ButtonState, PageDom};
use crate::profile::{name_from_title, normalize_profile_url, sanitize};
use crate::storage::ExtensionStorage;

/// Profile heading selectors, most specific first.
pub const NAME_SELECTORS: &[&str] = &[
    "h1.text-heading-xlarge",
    "h1.inline.t-24",
    ".pv-text-details__left-panel h1",
    "main h1",
    "h1",
];

/// Where the button goes when it cannot sit next to the anchor.
pub const CONTAINER_SELECTORS: &[&str] = &[".pvs-profile-actions", ".pv-top-card-v2-ctas", "main"];

pub const MSG_NO_NAME: &str = "Could not find the profile name on this page.";
pub const MSG_CONTEXT_INVALIDATED: &str = "Extension was updated. Please refresh the page.";
pub const MSG_NOT_SIGNED_IN: &str = "Please log in to Rolodink from the extension popup first.";
pub const MSG_SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";
pub const MSG_ADD_FAILED: &str = "Failed to add connection.";
pub const MSG_MEETING_PLACE: &str = "Where did you meet? (optional)";

/// How a click on the button ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Added,
    /// The server already had this profile; shown the same as `Added`.
    AlreadyAdded,
    NoName,
    ContextInvalidated,
    NotSignedIn,
    SessionExpired,
    /// Alerted with the given message.
    Failed(String),
}

pub struct InjectionController<D: PageDom, S: ExtensionStorage> {
    dom: Rc<D>,
    client: ApiClient<S>,
}

impl<D: PageDom, S: ExtensionStorage> InjectionController<D, S> {
    pub fn new(dom: Rc<D>, client: ApiClient<S>) -> Self {
        Self { dom, client }
    }

    /// One observer check: find the anchor and mount the button next to it.
    ///
    /// Returns the button only when it was mounted by this call.
    pub fn check(&self) -> Option<D::Element> {
        if self.dom.element_by_id(BUTTON_ID).is_some() {
            return None;
        }
        let anchor = locate_anchor(self.dom.as_ref())?;
        self.ensure_button(&anchor)
    }

    /// Creates and inserts the button unless it is already in the page.
    pub fn ensure_button(&self, anchor: &D::Element) -> Option<D::Element> {
        if self.dom.element_by_id(BUTTON_ID).is_some() {
            return None;
        }

        let button = match self.dom.create_button(BUTTON_ID) {
            Ok(button) => button,
            Err(err) => {
                log::warn!("could not create button: {err}");
                return None;
            }
        };

        if self.dom.insert_after(anchor, &button).is_ok() {
            return Some(button);
        }

        if let Some(parent) = self.dom.parent(anchor) {
            if self.dom.append_child(&parent, &button).is_ok() {
                return Some(button);
            }
        }

        for selector in CONTAINER_SELECTORS {
            if let Some(container) = self.dom.query_selector(selector) {
                if self.dom.append_child(&container, &button).is_ok() {
                    return Some(button);
                }
            }
        }

        log::warn!("no insertion point for button");
        None
    }

    /// Flips the button to "added" when the signed-in user already has a note
    /// for this page. Never surfaces an error.
    pub async fn refresh_state(&self, button: &D::Element) {
        let token = match self.client.access_token().await {
            Ok(Some(token)) => token,
            Ok(None) => return,
            Err(err) => {
                log::debug!("state check skipped: {err}");
                return;
            }
        };

        let url = normalize_profile_url(&self.dom.location_href());
        match self.client.find_by_url(&token, &url).await {
            Ok(Some(_)) => self.dom.set_button_state(button, ButtonState::Added),
            Ok(None) => {}
            Err(err) => log::debug!("state check failed: {err}"),
        }
    }

    pub fn extract_profile_name(&self) -> Option<String> {
        NAME_SELECTORS
            .iter()
            .filter_map(|selector| self.dom.query_selector(selector))
            .filter_map(|heading| self.dom.text_content(&heading))
            .map(|text| sanitize(&text))
            .find(|name| !name.is_empty())
            .or_else(|| name_from_title(&self.dom.title()))
    }

    pub async fn handle_click(&self, button: &D::Element) -> ClickOutcome {
        let Some(name) = self.extract_profile_name() else {
            self.dom.alert(MSG_NO_NAME);
            return ClickOutcome::NoName;
        };

        let token = match self.client.access_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                self.dom.alert(MSG_NOT_SIGNED_IN);
                return ClickOutcome::NotSignedIn;
            }
            Err(err) if err.is_context_invalidated() => {
                self.dom.alert(MSG_CONTEXT_INVALIDATED);
                return ClickOutcome::ContextInvalidated;
            }
            Err(err) => {
                log::warn!("token read failed: {err}");
                self.dom.alert(MSG_ADD_FAILED);
                return ClickOutcome::Failed(MSG_ADD_FAILED.to_string());
            }
        };

        let url = normalize_profile_url(&self.dom.location_href());
        let new = NewConnection {
            meeting_place: self.ask_meeting_place().await,
            ..NewConnection::new(name, url)
        };
        self.dom.set_button_state(button, ButtonState::Saving);

        match self.client.create(&token, &new).await {
            Ok(CreateOutcome::Created(_)) => {
                self.dom.set_button_state(button, ButtonState::Added);
                ClickOutcome::Added
            }
            Ok(CreateOutcome::AlreadyExists) => {
                self.dom.set_button_state(button, ButtonState::Added);
                ClickOutcome::AlreadyAdded
            }
            Err(err) => {
                self.dom.set_button_state(button, ButtonState::Add);
                self.report_failure(err)
            }
        }
    }

    /// Asks for the meeting place when the popup has the context field on.
    async fn ask_meeting_place(&self) -> Option<String> {
        let enabled = match self.client.settings().await {
            Ok(settings) => settings.context_field_enabled,
            Err(err) => {
                log::debug!("settings unavailable: {err}");
                false
            }
        };
        if !enabled {
            return None;
        }
        self.dom
            .prompt(MSG_MEETING_PLACE)
            .map(|answer| answer.trim().to_string())
            .filter(|answer| !answer.is_empty())
    }

    fn report_failure(&self, err: ClientError) -> ClickOutcome {
        match err {
            ClientError::Unauthorized => {
                self.dom.alert(MSG_SESSION_EXPIRED);
                ClickOutcome::SessionExpired
            }
            err if err.is_context_invalidated() => {
                self.dom.alert(MSG_CONTEXT_INVALIDATED);
                ClickOutcome::ContextInvalidated
            }
            err => {
                log::warn!("add connection failed: {err}");
                let message = err.server_message().unwrap_or(MSG_ADD_FAILED).to_string();
                self.dom.alert(&message);
                ClickOutcome::Failed(message)
            }
        }
    }
}

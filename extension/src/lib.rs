//! Content-script core of the Rolodink browser extension.
//!
//! The logic is written against small capability traits ([`dom::PageDom`],
//! [`storage::ExtensionStorage`], [`observer::FrameScheduler`]) so it runs
//! natively under test. The `browser` module binds those traits to the real
//! page on `wasm32`.

pub mod anchor;
pub mod client;
pub mod dom;
pub mod inject;
pub mod observer;
pub mod profile;
pub mod storage;

#[cfg(target_arch = "wasm32")]
pub mod browser;

pub use anchor::{ANCHOR_SELECTORS, locate_anchor};
pub use client::{ApiClient, ClientError, CreateOutcome};
pub use dom::{BUTTON_ID, ButtonState, PageDom};
pub use inject::{ClickOutcome, InjectionController};
pub use observer::{FrameScheduler, ObserverLoop};
pub use profile::{name_from_title, normalize_profile_url, sanitize, sanitize_profile_name};
pub use storage::{BrowserTarget, ExtensionStorage, MemoryStorage, StorageError};

//! `web-sys` bindings for the capability traits and the content-script entry
//! point. Only compiled for `wasm32`.

use std::rc::Rc;

use async_trait::async_trait;
use js_sys::{Function, JSON, Object, Promise, Reflect};
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{
    Document, Element, Event, HtmlButtonElement, MutationObserver, MutationObserverInit, Window,
};

use crate::client::ApiClient;
use crate::dom::{ButtonState, DomError, PageDom};
use crate::inject::InjectionController;
use crate::observer::{FrameScheduler, ObserveTarget, ObserverLoop};
use crate::storage::{BrowserTarget, DEFAULT_API_BASE_URL, ExtensionStorage, StorageError};

const BUTTON_CLASSES: &str = "artdeco-button artdeco-button--2 artdeco-button--secondary ml2";

fn js_message(value: &JsValue) -> String {
    value
        .dyn_ref::<js_sys::Error>()
        .map(|err| String::from(err.message()))
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

pub struct WebDom {
    window: Window,
    document: Document,
}

impl PageDom for WebDom {
    type Element = Element;

    fn query_selector(&self, selector: &str) -> Option<Element> {
        self.document.query_selector(selector).ok().flatten()
    }

    fn element_by_id(&self, id: &str) -> Option<Element> {
        self.document.get_element_by_id(id)
    }

    fn parent(&self, element: &Element) -> Option<Element> {
        element.parent_element()
    }

    fn text_content(&self, element: &Element) -> Option<String> {
        element.text_content()
    }

    fn create_button(&self, id: &str) -> Result<Element, DomError> {
        let button = self
            .document
            .create_element("button")
            .map_err(|err| DomError(js_message(&err)))?;
        button.set_id(id);
        button.set_class_name(BUTTON_CLASSES);
        self.set_button_state(&button, ButtonState::Add);
        Ok(button)
    }

    fn insert_after(&self, anchor: &Element, node: &Element) -> Result<(), DomError> {
        anchor
            .insert_adjacent_element("afterend", node)
            .map(|_| ())
            .map_err(|err| DomError(js_message(&err)))
    }

    fn append_child(&self, parent: &Element, node: &Element) -> Result<(), DomError> {
        parent
            .append_child(node)
            .map(|_| ())
            .map_err(|err| DomError(js_message(&err)))
    }

    fn set_button_state(&self, button: &Element, state: ButtonState) {
        button.set_text_content(Some(state.label()));
        if let Some(button) = button.dyn_ref::<HtmlButtonElement>() {
            button.set_disabled(state.disabled());
        }
    }

    fn title(&self) -> String {
        self.document.title()
    }

    fn location_href(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn has_body(&self) -> bool {
        self.document.body().is_some()
    }

    fn alert(&self, message: &str) {
        if let Err(err) = self.window.alert_with_message(message) {
            log::warn!("alert failed: {}", js_message(&err));
        }
    }

    fn prompt(&self, message: &str) -> Option<String> {
        self.window
            .prompt_with_message(message)
            .unwrap_or_else(|err| {
                log::warn!("prompt failed: {}", js_message(&err));
                None
            })
    }
}

/// `storage.local` of whichever extension namespace the page exposes.
/// Calls are made without a callback, so the API must return promises
/// (Firefox, or Chrome under Manifest V3).
pub struct JsStorage {
    area: JsValue,
}

impl JsStorage {
    pub fn for_target(target: BrowserTarget) -> Result<Self, StorageError> {
        let global = js_sys::global();
        let namespace = Reflect::get(&global, &target.global_name().into())
            .map_err(|err| StorageError::new(js_message(&err)))?;
        let storage = Reflect::get(&namespace, &"storage".into())
            .map_err(|err| StorageError::new(js_message(&err)))?;
        let area = Reflect::get(&storage, &"local".into())
            .map_err(|err| StorageError::new(js_message(&err)))?;
        if area.is_undefined() {
            return Err(StorageError::new("storage.local is not available"));
        }
        Ok(Self { area })
    }

    async fn call(&self, method: &str, arg: &JsValue) -> Result<JsValue, StorageError> {
        let to_error = |err: JsValue| StorageError::new(js_message(&err));
        let function: Function = Reflect::get(&self.area, &method.into())
            .map_err(to_error)?
            .dyn_into()
            .map_err(to_error)?;
        let promise: Promise = function
            .call1(&self.area, arg)
            .map_err(to_error)?
            .dyn_into()
            .map_err(|_| {
                StorageError::new(format!("storage.local.{method} did not return a promise"))
            })?;
        JsFuture::from(promise).await.map_err(to_error)
    }
}

#[async_trait(?Send)]
impl ExtensionStorage for JsStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let items = self.call("get", &JsValue::from_str(key)).await?;
        let value = Reflect::get(&items, &key.into())
            .map_err(|err| StorageError::new(js_message(&err)))?;
        if value.is_undefined() || value.is_null() {
            return Ok(None);
        }
        let text = JSON::stringify(&value)
            .map_err(|err| StorageError::new(js_message(&err)))?;
        serde_json::from_str(&String::from(text))
            .map(Some)
            .map_err(|err| StorageError::new(err.to_string()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let text = serde_json::to_string(&value).map_err(|err| StorageError::new(err.to_string()))?;
        let parsed = JSON::parse(&text).map_err(|err| StorageError::new(js_message(&err)))?;
        let items = Object::new();
        Reflect::set(&items, &key.into(), &parsed)
            .map_err(|err| StorageError::new(js_message(&err)))?;
        self.call("set", &items).await.map(|_| ())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.call("remove", &JsValue::from_str(key)).await.map(|_| ())
    }
}

pub struct AnimationFrames {
    window: Window,
}

impl FrameScheduler for AnimationFrames {
    fn request_frame(&self, callback: Box<dyn FnOnce()>) {
        let callback = Closure::once_into_js(callback);
        if let Err(err) = self.window.request_animation_frame(callback.unchecked_ref()) {
            log::warn!("requestAnimationFrame failed: {}", js_message(&err));
        }
    }
}

fn detect_target() -> Option<BrowserTarget> {
    let global = js_sys::global();
    let defined = |name: &str| {
        Reflect::get(&global, &name.into())
            .map(|value| !value.is_undefined())
            .unwrap_or(false)
    };
    BrowserTarget::detect(defined("browser"), defined("chrome"))
}

type Controller = InjectionController<WebDom, JsStorage>;

/// Wires a freshly mounted button: state check plus click handler.
fn on_mount(controller: &Rc<Controller>, button: Element) {
    {
        let controller = Rc::clone(controller);
        let button = button.clone();
        spawn_local(async move { controller.refresh_state(&button).await });
    }

    let controller = Rc::clone(controller);
    let target = button.clone();
    let handler = Closure::<dyn FnMut(Event)>::new(move |event: Event| {
        event.prevent_default();
        event.stop_propagation();
        let controller = Rc::clone(&controller);
        let button = target.clone();
        spawn_local(async move {
            let outcome = controller.handle_click(&button).await;
            log::debug!("click handled: {outcome:?}");
        });
    });
    if let Err(err) = button.add_event_listener_with_callback("click", handler.as_ref().unchecked_ref()) {
        log::warn!("could not attach click handler: {}", js_message(&err));
    }
    // The button lives as long as the page.
    handler.forget();
}

fn observe(observer: &MutationObserver, document: &Document, target: ObserveTarget) {
    let init = MutationObserverInit::new();
    init.set_child_list(true);
    let node: Option<Element> = match target {
        ObserveTarget::Body => {
            init.set_subtree(true);
            document.body().map(Element::from)
        }
        ObserveTarget::DocumentElement => document.document_element(),
    };
    let Some(node) = node else {
        return;
    };
    if let Err(err) = observer.observe_with_options(&node, &init) {
        log::warn!("observe failed: {}", js_message(&err));
    }
}

async fn run() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    let Some(target) = detect_target() else {
        log::warn!("no extension namespace; content script idle");
        return Ok(());
    };
    let storage = Rc::new(JsStorage::for_target(target).map_err(|err| JsValue::from_str(err.message()))?);
    let client = match ApiClient::from_settings(Rc::clone(&storage)).await {
        Ok(client) => client,
        Err(err) => {
            log::warn!("settings unavailable, using defaults: {err}");
            ApiClient::new(DEFAULT_API_BASE_URL, storage)
        }
    };

    let dom = Rc::new(WebDom {
        window: window.clone(),
        document: document.clone(),
    });
    let controller = Rc::new(InjectionController::new(Rc::clone(&dom), client));

    let check = {
        let controller = Rc::clone(&controller);
        move || {
            if let Some(button) = controller.check() {
                on_mount(&controller, button);
            }
        }
    };
    let observer_loop = ObserverLoop::new(AnimationFrames { window }, check);

    let callback = {
        let observer_loop = Rc::clone(&observer_loop);
        let document = document.clone();
        Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
            move |_records: js_sys::Array, observer: MutationObserver| {
                if let Some(target) = observer_loop.on_mutations(document.body().is_some()) {
                    observer.disconnect();
                    observe(&observer, &document, target);
                }
            },
        )
    };
    let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
    callback.forget();

    let initial = observer_loop.start(dom.has_body());
    observe(&observer, &document, initial);
    log::info!("rolodink content script running on {target:?}");
    Ok(())
}

#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());

    spawn_local(async {
        if let Err(err) = run().await {
            log::error!("content script failed: {}", js_message(&err));
        }
    });
}

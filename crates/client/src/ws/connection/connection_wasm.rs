//! WASM/Web driver using `web_sys::WebSocket`.
//!
//! Everything runs on the browser event loop: socket callbacks and
//! `gloo_timers` futures borrow the shared [`ChatClient`] one at a time.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use gloo_timers::future::TimeoutFuture;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

use crate::config::{ClientConfig, ConfigError};
use crate::events::{ChatEvent, Effect};
use crate::session::ChatClient;
use crate::storage::{LocalStorage, SessionPersistence};

struct Inner {
    client: RefCell<ChatClient>,
    socket: RefCell<Option<WebSocket>>,
    /// Bumped per socket so callbacks from a replaced socket are ignored.
    generation: Cell<u64>,
    on_event: Box<dyn Fn(ChatEvent)>,
}

/// A chat client bound to the page it runs in.
#[derive(Clone)]
pub struct WebChat {
    inner: Rc<Inner>,
}

impl WebChat {
    /// Start a client for the current page, persisting to `localStorage`.
    pub fn for_current_page(on_event: impl Fn(ChatEvent) + 'static) -> Result<Self, ConfigError> {
        let config = ClientConfig::for_current_page();
        let persistence = config.persist.then(|| {
            SessionPersistence::new(
                Box::new(LocalStorage),
                config.storage_key.clone(),
                config.max_persisted_messages,
            )
        });
        let client = ChatClient::new(&config, persistence)?;
        Ok(Self::start(client, on_event))
    }

    pub fn start(client: ChatClient, on_event: impl Fn(ChatEvent) + 'static) -> Self {
        let inner = Rc::new(Inner {
            client: RefCell::new(client),
            socket: RefCell::new(None),
            generation: Cell::new(0),
            on_event: Box::new(on_event),
        });
        let effects = inner.client.borrow_mut().start();
        apply(&inner, effects);
        Self { inner }
    }

    pub fn send_message(&self, text: &str) {
        let effects = self.inner.client.borrow_mut().submit(text);
        apply(&self.inner, effects);
    }

    pub fn reconnect(&self) {
        let effects = self.inner.client.borrow_mut().reconnect_now();
        apply(&self.inner, effects);
    }

    /// Read access to the client, e.g. to render a snapshot.
    pub fn with_client<R>(&self, f: impl FnOnce(&ChatClient) -> R) -> R {
        f(&self.inner.client.borrow())
    }
}

fn apply(inner: &Rc<Inner>, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Connect { url } => open_socket(inner, url.as_str()),
            Effect::Transmit { payload } => {
                let result = match inner.socket.borrow().as_ref() {
                    Some(ws) if ws.ready_state() == WebSocket::OPEN => ws
                        .send_with_str(&payload)
                        .map_err(|e| format!("{:?}", e)),
                    _ => Err("socket is not open".to_string()),
                };
                if let Err(detail) = result {
                    let next = inner.client.borrow_mut().handle_send_failed(&detail);
                    apply(inner, next);
                }
            }
            Effect::ScheduleReconnect { delay, token } => {
                let inner = inner.clone();
                spawn_local(async move {
                    TimeoutFuture::new(millis(delay)).await;
                    let next = inner.client.borrow_mut().handle_reconnect_timer(token);
                    apply(&inner, next);
                });
            }
            Effect::ScheduleNoticeExpiry { id, delay } => {
                let inner = inner.clone();
                spawn_local(async move {
                    TimeoutFuture::new(millis(delay)).await;
                    let next = inner.client.borrow_mut().handle_notice_expired(id);
                    apply(&inner, next);
                });
            }
            Effect::Emit(event) => (inner.on_event)(event),
        }
    }
}

fn millis(delay: Duration) -> u32 {
    delay.as_millis().min(u32::MAX as u128) as u32
}

fn open_socket(inner: &Rc<Inner>, url: &str) {
    let generation = inner.generation.get() + 1;
    inner.generation.set(generation);

    let ws = match WebSocket::new(url) {
        Ok(ws) => ws,
        Err(e) => {
            let detail = format!("Failed to create WebSocket: {:?}", e);
            let next = inner.client.borrow_mut().handle_close(None, &detail);
            apply(inner, next);
            return;
        }
    };

    let current = {
        let inner = inner.clone();
        move || inner.generation.get() == generation
    };

    // Set up open handler
    let inner_open = inner.clone();
    let is_current = current.clone();
    let onopen_callback = Closure::wrap(Box::new(move |_: Event| {
        if !is_current() {
            return;
        }
        let next = inner_open.client.borrow_mut().handle_open();
        apply(&inner_open, next);
    }) as Box<dyn FnMut(Event)>);
    ws.set_onopen(Some(onopen_callback.as_ref().unchecked_ref()));
    onopen_callback.forget();

    // Set up message handler
    let inner_message = inner.clone();
    let is_current = current.clone();
    let onmessage_callback = Closure::wrap(Box::new(move |e: MessageEvent| {
        if !is_current() {
            return;
        }
        let Some(text) = e.data().as_string() else {
            crate::log_warn!("Ignoring non-text WebSocket frame");
            return;
        };
        let next = inner_message.client.borrow_mut().handle_message(&text);
        apply(&inner_message, next);
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage_callback.as_ref().unchecked_ref()));
    onmessage_callback.forget();

    // Set up error handler
    let inner_error = inner.clone();
    let is_current = current.clone();
    let onerror_callback = Closure::wrap(Box::new(move |e: Event| {
        if !is_current() {
            return;
        }
        let detail = format!("WebSocket error event: {}", e.type_());
        let next = inner_error
            .client
            .borrow_mut()
            .handle_transport_error(&detail);
        apply(&inner_error, next);
    }) as Box<dyn FnMut(Event)>);
    ws.set_onerror(Some(onerror_callback.as_ref().unchecked_ref()));
    onerror_callback.forget();

    // Set up close handler
    let inner_close = inner.clone();
    let is_current = current;
    let onclose_callback = Closure::wrap(Box::new(move |e: CloseEvent| {
        if !is_current() {
            return;
        }
        inner_close.socket.borrow_mut().take();
        let next = inner_close
            .client
            .borrow_mut()
            .handle_close(Some(e.code()), &e.reason());
        apply(&inner_close, next);
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
    onclose_callback.forget();

    *inner.socket.borrow_mut() = Some(ws);
}

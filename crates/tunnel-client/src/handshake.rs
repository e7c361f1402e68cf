//! Client Handshake State Machine.
//!
//! ```text
//! initial --init--> session_loaded --exchange_keys--> keys_exchanged
//!                        |                                  |
//!                        +--------------ready---------------+--> ready --send_message--> message_sent
//! ```
//!
//! Each event's action runs after the transition and may raise the next
//! event; dispatch is a loop, never reentrant. Any failed action raises
//! `error`, which is terminal for the run.

use std::fmt;
use tracing::{debug, info, warn};
use tunnel_common::{Error, Result};

use crate::cache::SessionCache;
use crate::client::TunnelClient;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    Initial,
    SessionLoaded,
    KeysExchanged,
    Ready,
    MessageSent,
    Error,
}

impl HandshakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::SessionLoaded => "session_loaded",
            Self::KeysExchanged => "keys_exchanged",
            Self::Ready => "ready",
            Self::MessageSent => "message_sent",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeEvent {
    Init,
    ExchangeKeys,
    Ready,
    SendMessage,
    Error,
}

impl HandshakeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ExchangeKeys => "exchange_keys",
            Self::Ready => "ready",
            Self::SendMessage => "send_message",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for HandshakeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination of `event` from `from`, or `None` if the event is not allowed.
pub fn transition(from: HandshakeState, event: HandshakeEvent) -> Option<HandshakeState> {
    use HandshakeEvent as E;
    use HandshakeState as S;

    match (from, event) {
        (S::Initial, E::Init) => Some(S::SessionLoaded),
        (S::SessionLoaded, E::ExchangeKeys) => Some(S::KeysExchanged),
        (S::SessionLoaded | S::KeysExchanged, E::Ready) => Some(S::Ready),
        (S::Ready | S::MessageSent, E::SendMessage) => Some(S::MessageSent),
        (S::Error, E::Error) => None,
        (_, E::Error) => Some(S::Error),
        _ => None,
    }
}

type StateObserver = Box<dyn FnMut(HandshakeState) + Send>;
type ErrorObserver = Box<dyn FnMut(HandshakeState, &Error) + Send>;

/// Drives a [`TunnelClient`] through the handshake.
pub struct Handshake<T, C> {
    client: TunnelClient<T, C>,
    state: HandshakeState,
    history: Vec<HandshakeState>,
    auto_send: Option<String>,
    outbox: Option<String>,
    last_reply: Option<String>,
    last_error: Option<Error>,
    state_observers: Vec<StateObserver>,
    error_observers: Vec<ErrorObserver>,
}

impl<T: Transport, C: SessionCache> Handshake<T, C> {
    pub fn new(client: TunnelClient<T, C>) -> Self {
        Self {
            client,
            state: HandshakeState::Initial,
            history: vec![HandshakeState::Initial],
            auto_send: None,
            outbox: None,
            last_reply: None,
            last_error: None,
            state_observers: Vec::new(),
            error_observers: Vec::new(),
        }
    }

    /// Message sent automatically on entering `ready`.
    pub fn with_auto_send(mut self, message: Option<String>) -> Self {
        self.auto_send = message;
        self
    }

    /// Called with every state entered, after the transition.
    pub fn on_state(mut self, observer: impl FnMut(HandshakeState) + Send + 'static) -> Self {
        self.state_observers.push(Box::new(observer));
        self
    }

    /// Called once when the run fails, with the state it failed from.
    pub fn on_error(
        mut self,
        observer: impl FnMut(HandshakeState, &Error) + Send + 'static,
    ) -> Self {
        self.error_observers.push(Box::new(observer));
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Every state entered so far, starting with `initial`.
    pub fn history(&self) -> &[HandshakeState] {
        &self.history
    }

    pub fn last_reply(&self) -> Option<&str> {
        self.last_reply.as_deref()
    }

    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub fn client(&self) -> &TunnelClient<T, C> {
        &self.client
    }

    pub fn into_client(self) -> TunnelClient<T, C> {
        self.client
    }

    /// Start the run with `init`. Returns the state the run settled in.
    pub async fn run(&mut self) -> Result<HandshakeState> {
        self.fire(HandshakeEvent::Init).await
    }

    /// Send one message from `ready` or `message_sent`.
    pub async fn send(&mut self, message: &str) -> Result<String> {
        self.outbox = Some(message.to_string());
        self.last_reply = None;
        self.fire(HandshakeEvent::SendMessage).await?;

        match (self.state, self.last_reply.clone()) {
            (HandshakeState::MessageSent, Some(reply)) => Ok(reply),
            _ => Err(self
                .last_error
                .take()
                .unwrap_or_else(|| Error::internal("message was not sent"))),
        }
    }

    /// Raise `event` and every event its actions chain into.
    ///
    /// Errors only when `event` is not allowed in the current state; failed
    /// actions move the machine to `error` instead.
    pub async fn fire(&mut self, event: HandshakeEvent) -> Result<HandshakeState> {
        let mut next = Some(event);
        while let Some(event) = next.take() {
            let from = self.state;
            let to = transition(from, event).ok_or_else(|| {
                Error::input(format!("event {event} inappropriate in current state {from}"))
            })?;
            self.enter(to);
            next = self.after(event, from).await;
        }
        Ok(self.state)
    }

    fn enter(&mut self, to: HandshakeState) {
        debug!(from = %self.state, to = %to, "handshake transition");
        self.state = to;
        self.history.push(to);
        for observer in &mut self.state_observers {
            observer(to);
        }
    }

    async fn after(&mut self, event: HandshakeEvent, from: HandshakeState) -> Option<HandshakeEvent> {
        match event {
            HandshakeEvent::Init => match self.client.load_cached_session() {
                Ok(true) => Some(HandshakeEvent::Ready),
                Ok(false) => Some(HandshakeEvent::ExchangeKeys),
                Err(e) => {
                    warn!("session cache unavailable, exchanging keys: {}", e);
                    Some(HandshakeEvent::ExchangeKeys)
                }
            },
            HandshakeEvent::ExchangeKeys => match self.client.exchange_keys().await {
                Ok(()) => Some(HandshakeEvent::Ready),
                Err(e) => self.fail(e),
            },
            HandshakeEvent::Ready => {
                info!("client ready to send messages");
                self.outbox = self.auto_send.clone();
                self.outbox.as_ref().map(|_| HandshakeEvent::SendMessage)
            }
            HandshakeEvent::SendMessage => {
                let Some(message) = self.outbox.take() else {
                    return self.fail(Error::input("no message to send"));
                };
                match self.client.send_message(&message).await {
                    Ok(reply) => {
                        info!(reply = %reply, "server replied");
                        self.last_reply = Some(reply);
                        None
                    }
                    Err(e) => self.fail(e),
                }
            }
            HandshakeEvent::Error => {
                if let Some(err) = self.last_error.as_ref() {
                    warn!(failed_from = %from, "handshake failed: {}", err);
                    for observer in &mut self.error_observers {
                        observer(from, err);
                    }
                }
                None
            }
        }
    }

    fn fail(&mut self, err: Error) -> Option<HandshakeEvent> {
        self.last_error = Some(err);
        Some(HandshakeEvent::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HandshakeEvent as E;
    use HandshakeState as S;

    #[test]
    fn test_transition_table() {
        assert_eq!(transition(S::Initial, E::Init), Some(S::SessionLoaded));
        assert_eq!(
            transition(S::SessionLoaded, E::ExchangeKeys),
            Some(S::KeysExchanged)
        );
        assert_eq!(transition(S::SessionLoaded, E::Ready), Some(S::Ready));
        assert_eq!(transition(S::KeysExchanged, E::Ready), Some(S::Ready));
        assert_eq!(transition(S::Ready, E::SendMessage), Some(S::MessageSent));
        assert_eq!(
            transition(S::MessageSent, E::SendMessage),
            Some(S::MessageSent)
        );
    }

    #[test]
    fn test_error_reachable_from_every_non_terminal_state() {
        for from in [
            S::Initial,
            S::SessionLoaded,
            S::KeysExchanged,
            S::Ready,
            S::MessageSent,
        ] {
            assert_eq!(transition(from, E::Error), Some(S::Error));
        }
    }

    #[test]
    fn test_error_is_terminal() {
        for event in [E::Init, E::ExchangeKeys, E::Ready, E::SendMessage, E::Error] {
            assert_eq!(transition(S::Error, event), None);
        }
    }

    #[test]
    fn test_rejected_transitions() {
        assert_eq!(transition(S::Initial, E::Ready), None);
        assert_eq!(transition(S::Initial, E::SendMessage), None);
        assert_eq!(transition(S::KeysExchanged, E::ExchangeKeys), None);
        assert_eq!(transition(S::SessionLoaded, E::SendMessage), None);
        assert_eq!(transition(S::Ready, E::Init), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(S::SessionLoaded.to_string(), "session_loaded");
        assert_eq!(E::ExchangeKeys.to_string(), "exchange_keys");
    }
}

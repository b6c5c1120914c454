//! One request/response cycle over an injected transport.

use super::request::{seal_request, RequestPayload};
use super::response::{open_response, ResponsePayload};
use super::{GroupKeys, ResponseCode};
use crate::error::{FatalError, JerichoError, Result};
use rand::{CryptoRng, RngCore};
use std::future::Future;
use std::time::Duration;

/// Carries an opaque base64 body to the relay and returns its reply.
///
/// Implementations POST the body with a generic form content type and add
/// nothing outside the envelope. Failures are reported as
/// [`JerichoError::Transport`].
pub trait Transport {
    fn send(&self, body: String) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    Building,
    /// Handed to the transport
    Sent,
    /// Body received, not yet verified
    AwaitingResponse,
    Verified,
    Rejected,
    NetworkFailure,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Verified | RequestState::Rejected | RequestState::NetworkFailure
        )
    }
}

/// State of the request in flight. Transitions outside the cycle are a bug.
#[derive(Debug, Default)]
pub struct RequestCycle {
    state: RequestState,
}

impl RequestCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, next: RequestState) -> Result<()> {
        use RequestState::*;
        let allowed = matches!(
            (self.state, next),
            (Idle, Building)
                | (Building, Sent)
                | (Building, Idle)
                | (Sent, AwaitingResponse)
                | (Sent, NetworkFailure)
                | (AwaitingResponse, Verified)
                | (AwaitingResponse, Rejected)
                | (Verified, Idle)
                | (Rejected, Idle)
                | (NetworkFailure, Idle)
        );
        if !allowed {
            tracing::error!(from = ?self.state, to = ?next, "invalid request state transition");
            let transition = format!("{:?} -> {:?}", self.state, next);
            return Err(FatalError::InvalidStateTransition(transition).into());
        }
        self.state = next;
        Ok(())
    }

    /// Seal `payload`, send it and verify the reply.
    ///
    /// The cycle is left in its terminal state so callers can inspect the
    /// outcome; the next exchange returns it to `Idle` first. A timeout and a
    /// transport error both end in `NetworkFailure`.
    pub async fn exchange<T, R>(
        &mut self,
        transport: &T,
        keys: &GroupKeys,
        payload: &RequestPayload,
        rng: &mut R,
        timeout: Duration,
    ) -> Result<ResponsePayload>
    where
        T: Transport + ?Sized,
        R: RngCore + CryptoRng + ?Sized,
    {
        if self.state.is_terminal() {
            self.advance(RequestState::Idle)?;
        }

        self.advance(RequestState::Building)?;
        let sealed = match seal_request(keys, payload, rng) {
            Ok(sealed) => sealed,
            Err(e) => {
                self.advance(RequestState::Idle)?;
                return Err(e);
            }
        };

        self.advance(RequestState::Sent)?;
        let body = match tokio::time::timeout(timeout, transport.send(sealed.body)).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "transport failed");
                self.advance(RequestState::NetworkFailure)?;
                return Err(JerichoError::Response(ResponseCode::NetworkResponseFailure));
            }
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "request timed out");
                self.advance(RequestState::NetworkFailure)?;
                return Err(JerichoError::Response(ResponseCode::NetworkFetchException));
            }
        };

        self.advance(RequestState::AwaitingResponse)?;
        match open_response(keys, &body, &sealed.mac) {
            Ok(response) => {
                self.advance(RequestState::Verified)?;
                Ok(response)
            }
            Err(e) => {
                self.advance(RequestState::Rejected)?;
                Err(e)
            }
        }
    }
}

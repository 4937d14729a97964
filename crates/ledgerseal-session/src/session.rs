//! Session state and its lifecycle.
//!
//! A [`Session`] records which identity is connected and whether that
//! identity has been authenticated against the ledger. Every change to
//! authorization bumps the session epoch, so callers that captured an epoch
//! before a long await can tell whether the session they started under
//! still holds.

use std::sync::Arc;

use ledgerseal_core::Identity;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::error::{HandshakeError, Result, SessionError};
use crate::handshake::{Cancellation, IdentityHandshake};
use crate::ledger::{Ledger, TxReceipt};
use crate::wallet::{Wallet, WalletEvent};

/// Connected identity and authentication flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    identity: Option<Identity>,
    authenticated: bool,
    epoch: u64,
}

impl Session {
    /// A fresh, disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    /// The connected identity, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Whether the connected identity is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated && self.identity.is_some()
    }

    /// Authorization epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Record `identity` as connected. A different identity drops
    /// authentication.
    pub fn connect(&mut self, identity: Identity) {
        if self.identity.as_ref() != Some(&identity) {
            self.authenticated = false;
            self.identity = Some(identity);
            self.epoch += 1;
        }
    }

    /// Mark `identity` authenticated. Ignored unless it is the connected
    /// identity.
    pub fn mark_authenticated(&mut self, identity: &Identity) -> bool {
        if self.identity.as_ref() == Some(identity) {
            self.authenticated = true;
            true
        } else {
            false
        }
    }

    /// Drop authentication, keeping the identity.
    pub fn invalidate(&mut self) {
        self.authenticated = false;
        self.epoch += 1;
    }

    /// Forget the identity entirely.
    pub fn disconnect(&mut self) {
        self.identity = None;
        self.authenticated = false;
        self.epoch += 1;
    }

    /// Apply a wallet notification.
    pub fn apply(&mut self, event: &WalletEvent) {
        match event {
            WalletEvent::IdentityChanged(Some(identity)) => self.connect(identity.clone()),
            WalletEvent::IdentityChanged(None) => self.disconnect(),
            WalletEvent::NetworkChanged { .. } => self.invalidate(),
        }
    }

    /// The authenticated identity and current epoch, or `NotAuthenticated`.
    pub fn require_authenticated(&self) -> Result<(Identity, u64)> {
        match &self.identity {
            Some(identity) if self.authenticated => Ok((identity.clone(), self.epoch)),
            _ => Err(SessionError::NotAuthenticated),
        }
    }

    /// Fails with `Invalidated` unless the session is still authenticated
    /// as `identity` at `epoch`.
    pub fn ensure_unchanged(&self, identity: &Identity, epoch: u64) -> Result<()> {
        if self.epoch == epoch && self.authenticated && self.identity.as_ref() == Some(identity) {
            Ok(())
        } else {
            Err(SessionError::Invalidated)
        }
    }
}

/// Configuration for session handling.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Adopt a session the ledger already holds for the connected identity
    /// instead of requiring a new handshake.
    pub resume_ledger_sessions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_ledger_sessions: true,
        }
    }
}

/// Owns the session and mediates every transition.
///
/// Wallet notifications are queued by the provider and applied whenever the
/// session is read, so a stale authorization is never reported or used.
pub struct SessionManager<L: Ledger + ?Sized, W: Wallet + ?Sized> {
    ledger: Arc<L>,
    wallet: Arc<W>,
    config: SessionConfig,
    session: Session,
    events: broadcast::Receiver<WalletEvent>,
    handshake: IdentityHandshake,
}

impl<L: Ledger + ?Sized, W: Wallet + ?Sized> SessionManager<L, W> {
    /// Create a manager and subscribe to wallet notifications.
    pub fn new(ledger: Arc<L>, wallet: Arc<W>, config: SessionConfig) -> Self {
        let events = wallet.subscribe();
        Self {
            ledger,
            wallet,
            config,
            session: Session::new(),
            events,
            handshake: IdentityHandshake::new(),
        }
    }

    /// The ledger.
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// The wallet.
    pub fn wallet(&self) -> &Arc<W> {
        &self.wallet
    }

    /// Current session, with every queued wallet notification applied.
    pub fn session(&mut self) -> &Session {
        self.process_events();
        &self.session
    }

    /// The handshake machine.
    pub fn handshake(&self) -> &IdentityHandshake {
        &self.handshake
    }

    /// Apply every queued wallet notification. Returns how many were applied.
    pub fn process_events(&mut self) -> usize {
        let mut applied = 0;
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    debug!(?event, "wallet event");
                    self.session.apply(&event);
                    applied += 1;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(missed, "wallet events dropped; invalidating session");
                    self.session.invalidate();
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        applied
    }

    /// Connect to the wallet and record its active identity.
    ///
    /// Resumes an existing ledger-side session when configured to.
    pub async fn connect(&mut self) -> Result<Identity> {
        self.process_events();
        let identity = self.wallet.active_identity().await?;
        self.process_events();
        self.session.connect(identity.clone());
        info!(identity = %identity, "wallet connected");

        if self.config.resume_ledger_sessions && !self.session.is_authenticated() {
            let epoch = self.session.epoch();
            if self.ledger.is_authenticated(&identity).await? {
                self.process_events();
                if self.session.epoch() == epoch && self.session.mark_authenticated(&identity) {
                    info!(identity = %identity, "resumed ledger session");
                }
            }
        }

        Ok(identity)
    }

    /// Authenticate the connected identity with a fresh handshake.
    ///
    /// Any failure leaves the session unauthenticated.
    pub async fn authenticate(&mut self, cancel: &mut Cancellation) -> Result<TxReceipt> {
        self.process_events();
        let identity = self
            .session
            .identity()
            .cloned()
            .ok_or(SessionError::NotConnected)?;

        self.session.invalidate();
        let epoch = self.session.epoch();

        let outcome = self
            .handshake
            .run(&identity, self.wallet.as_ref(), self.ledger.as_ref(), cancel)
            .await;

        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(e) => {
                if !matches!(e, HandshakeError::UserCancelled) {
                    warn!(identity = %identity, error = %e, "handshake failed");
                }
                return Err(e.into());
            }
        };

        self.process_events();
        if self.session.epoch() != epoch || !self.session.mark_authenticated(&identity) {
            warn!(identity = %identity, "session changed during handshake");
            return Err(SessionError::Invalidated);
        }

        info!(identity = %identity, "session authenticated");
        Ok(receipt)
    }

    /// End the session on the ledger and locally.
    ///
    /// Ending an unauthenticated session succeeds without contacting the
    /// ledger.
    pub async fn end_session(&mut self) -> Result<Option<TxReceipt>> {
        self.process_events();
        let (identity, _) = match self.session.require_authenticated() {
            Ok(current) => current,
            Err(_) => return Ok(None),
        };

        let receipt = self.ledger.end_session(&identity).await?;
        self.session.invalidate();
        info!(identity = %identity, "session ended");
        Ok(Some(receipt))
    }

    /// The authenticated identity and epoch, after applying queued events.
    pub fn require_authenticated(&mut self) -> Result<(Identity, u64)> {
        self.process_events();
        self.session.require_authenticated()
    }

    /// Confirm the session still matches what an operation started under.
    pub fn ensure_unchanged(&mut self, identity: &Identity, epoch: u64) -> Result<()> {
        self.process_events();
        self.session.ensure_unchanged(identity, epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerseal_core::Keypair;

    fn identity(seed: u8) -> Identity {
        Identity::from_public_key(&Keypair::from_seed(&[seed; 32]).public_key())
    }

    #[test]
    fn test_new_session_is_disconnected() {
        let session = Session::new();
        assert!(session.identity().is_none());
        assert!(!session.is_authenticated());
        assert!(matches!(
            session.require_authenticated(),
            Err(SessionError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_authenticate_requires_connected_identity() {
        let mut session = Session::new();
        assert!(!session.mark_authenticated(&identity(1)));

        session.connect(identity(1));
        assert!(!session.mark_authenticated(&identity(2)));
        assert!(session.mark_authenticated(&identity(1)));
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_identity_change_drops_authentication() {
        let mut session = Session::new();
        session.connect(identity(1));
        session.mark_authenticated(&identity(1));
        let epoch = session.epoch();

        session.apply(&WalletEvent::IdentityChanged(Some(identity(2))));

        assert_eq!(session.identity(), Some(&identity(2)));
        assert!(!session.is_authenticated());
        assert!(session.epoch() > epoch);
    }

    #[test]
    fn test_same_identity_event_is_noop() {
        let mut session = Session::new();
        session.connect(identity(1));
        session.mark_authenticated(&identity(1));
        let before = session.clone();

        session.apply(&WalletEvent::IdentityChanged(Some(identity(1))));

        assert_eq!(session, before);
    }

    #[test]
    fn test_disconnect_event_clears_identity() {
        let mut session = Session::new();
        session.connect(identity(1));
        session.mark_authenticated(&identity(1));

        session.apply(&WalletEvent::IdentityChanged(None));

        assert!(session.identity().is_none());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_network_change_keeps_identity() {
        let mut session = Session::new();
        session.connect(identity(1));
        session.mark_authenticated(&identity(1));

        session.apply(&WalletEvent::NetworkChanged { chain_id: 5 });

        assert_eq!(session.identity(), Some(&identity(1)));
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_ensure_unchanged_detects_epoch_bump() {
        let mut session = Session::new();
        session.connect(identity(1));
        session.mark_authenticated(&identity(1));
        let (id, epoch) = session.require_authenticated().unwrap();
        assert!(session.ensure_unchanged(&id, epoch).is_ok());

        session.invalidate();
        session.mark_authenticated(&identity(1));

        assert!(matches!(
            session.ensure_unchanged(&id, epoch),
            Err(SessionError::Invalidated)
        ));
    }
}

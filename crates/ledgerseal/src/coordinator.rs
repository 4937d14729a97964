//! The AccessCoordinator: session, vault and ledger behind one API.
//!
//! Every operation that writes to the ledger or the vault requires an
//! authenticated session, captures the session epoch at the start, and
//! re-checks it before anything is persisted locally.

use std::sync::Arc;

use ledgerseal_core::{Identity, ResourceFingerprint};
use ledgerseal_session::{
    Cancellation, HandshakeError, Ledger, LedgerError, Session, SessionConfig, SessionError,
    SessionManager, TxReceipt, Wallet, WalletError,
};
use ledgerseal_store::{KeyStore, PutResult};
use ledgerseal_vault::{
    validate_resource, vault_secret_message, EncryptedPayload, KeyVault, ResourceKey,
    SymmetricCipher, WrappedKey, WrappingSecret, X25519PublicKey,
};
use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, Result};

/// How the local vault's wrapping secret is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WrappingMode {
    /// Derived from the identity address. Anyone who knows the address can
    /// unwrap local entries.
    #[default]
    IdentityDerived,
    /// Derived from the wallet's signature over a fixed identity-bound
    /// message. Only the key holder can unwrap local entries.
    SignatureDerived,
}

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Wrapping secret for local vault entries. Grants always wrap under the
    /// grantee's identity-derived secret.
    pub wrapping: WrappingMode,
    /// Adopt an existing ledger session on connect.
    pub resume_ledger_sessions: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            wrapping: WrappingMode::IdentityDerived,
            resume_ledger_sessions: true,
        }
    }
}

/// Result of a successful `store_resource`.
#[derive(Debug, Clone)]
pub struct StoreReceipt {
    /// The encrypted payload. Persisting it is up to the caller.
    pub payload: EncryptedPayload,
    /// Fingerprint recorded on the ledger.
    pub fingerprint: ResourceFingerprint,
    /// Ledger confirmation of the fingerprint.
    pub tx: TxReceipt,
    /// Whether an earlier key for the resource was replaced.
    pub rotated: bool,
}

/// Result of a grant attempt that reached the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The ledger recorded the grant.
    Granted {
        tx: TxReceipt,
        /// Key material as submitted to the ledger.
        wrapped: Vec<u8>,
    },
    /// The ledger refused the grant.
    Rejected { reason: String },
}

impl GrantOutcome {
    /// Whether the grant was recorded.
    pub fn is_granted(&self) -> bool {
        matches!(self, GrantOutcome::Granted { .. })
    }
}

/// The main coordinator.
///
/// Owns the session and the key vault; the ledger and wallet are shared.
pub struct AccessCoordinator<L: Ledger, W: Wallet, S: KeyStore> {
    session: SessionManager<L, W>,
    vault: KeyVault<S>,
    config: CoordinatorConfig,
    /// Signature-derived secret, cached per identity.
    vault_secret: Option<(Identity, WrappingSecret)>,
}

impl<L: Ledger, W: Wallet, S: KeyStore> AccessCoordinator<L, W, S> {
    /// Create a coordinator.
    pub fn new(ledger: Arc<L>, wallet: Arc<W>, store: S, config: CoordinatorConfig) -> Self {
        let session_config = SessionConfig {
            resume_ledger_sessions: config.resume_ledger_sessions,
        };
        Self {
            session: SessionManager::new(ledger, wallet, session_config),
            vault: KeyVault::new(store),
            config,
            vault_secret: None,
        }
    }

    /// The current session, reflecting any wallet switch already signalled.
    pub fn session(&mut self) -> &Session {
        self.session.session()
    }

    /// The session manager.
    pub fn session_manager(&mut self) -> &mut SessionManager<L, W> {
        &mut self.session
    }

    /// The key vault.
    pub fn vault(&self) -> &KeyVault<S> {
        &self.vault
    }

    /// The configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────

    /// Connect to the wallet and return the active identity.
    pub async fn connect(&mut self) -> Result<Identity> {
        Ok(self.session.connect().await?)
    }

    /// Authenticate the connected identity with the ledger.
    ///
    /// In signature-derived mode the wallet is first asked to sign the vault
    /// message; declining it fails the whole authentication.
    pub async fn authenticate(&mut self, cancel: &mut Cancellation) -> Result<()> {
        let connected = self.session.session().identity().cloned();
        if let Some(identity) = connected {
            self.obtain_vault_secret(&identity, cancel).await?;
        }

        self.session.authenticate(cancel).await?;
        Ok(())
    }

    /// Obtain the signature-derived vault secret for the connected identity
    /// without a new handshake, e.g. after a resumed ledger session.
    ///
    /// A no-op in identity-derived mode or when the secret is already held.
    pub async fn unlock_vault(&mut self, cancel: &mut Cancellation) -> Result<()> {
        let identity = self
            .session
            .session()
            .identity()
            .cloned()
            .ok_or(SessionError::NotConnected)?;
        self.obtain_vault_secret(&identity, cancel).await
    }

    /// End the session. Succeeds without a ledger call when already
    /// unauthenticated.
    pub async fn end_session(&mut self) -> Result<()> {
        self.session.end_session().await?;
        self.vault_secret = None;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    /// Encrypt `plaintext` under a fresh key, record its fingerprint on the
    /// ledger and, once confirmed, keep the wrapped key locally.
    ///
    /// Nothing is persisted locally if the ledger call fails or the session
    /// changes while it is in flight.
    pub async fn store_resource(&mut self, resource: &str, plaintext: &[u8]) -> Result<StoreReceipt> {
        validate_resource(resource)?;
        let (identity, epoch) = self.session.require_authenticated()?;
        let secret = self.local_secret(&identity)?;

        let key = self.vault.generate_key();
        let payload = SymmetricCipher::encrypt(plaintext, key.as_bytes())?;
        let fingerprint = payload.fingerprint();

        let ledger = Arc::clone(self.session.ledger());
        let tx = ledger
            .store_fingerprint(&identity, resource, &fingerprint)
            .await
            .map_err(|e| {
                warn!(resource, error = %e, "fingerprint not recorded");
                e
            })?;

        self.session.ensure_unchanged(&identity, epoch)?;

        let put = self.vault.store_with(resource, &key, &secret).await?;
        info!(resource, owner = %identity, block = tx.block, "resource stored");

        Ok(StoreReceipt {
            payload,
            fingerprint,
            tx,
            rotated: put == PutResult::Replaced,
        })
    }

    /// Share `resource` with `grantee` by recording a key wrapped under the
    /// grantee's identity-derived secret.
    ///
    /// Fails with `ResourceNotFound` before any ledger call when no local key
    /// exists.
    pub async fn grant_access(&mut self, resource: &str, grantee: &Identity) -> Result<GrantOutcome> {
        let (identity, epoch, key) = self.authorized_key(resource).await?;
        let wrapped = self.vault.rewrap_for_recipient(&key, grantee)?.to_bytes()?;
        self.submit_grant(&identity, epoch, grantee, resource, wrapped).await
    }

    /// Share `resource` with `grantee` by recording a key sealed to the
    /// grantee's X25519 public key.
    pub async fn grant_access_sealed(
        &mut self,
        resource: &str,
        grantee: &Identity,
        recipient: &X25519PublicKey,
    ) -> Result<GrantOutcome> {
        let (identity, epoch, key) = self.authorized_key(resource).await?;
        let sealed = self.vault.seal_for(resource, &key, recipient)?.to_bytes()?;
        self.submit_grant(&identity, epoch, grantee, resource, sealed).await
    }

    /// Decrypt a payload for `resource` with the locally held key.
    pub async fn open_resource(&mut self, resource: &str, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        let (_, _, key) = self.authorized_key(resource).await?;
        Ok(SymmetricCipher::decrypt(payload, key.as_bytes())?)
    }

    /// Import a key granted to the current identity, keeping it in the local
    /// vault under this coordinator's wrapping secret.
    pub async fn accept_grant(&mut self, resource: &str, wrapped: &[u8]) -> Result<ResourceKey> {
        validate_resource(resource)?;
        let (identity, epoch) = self.session.require_authenticated()?;
        let key = self.vault.unwrap_for(&WrappedKey::from_bytes(wrapped)?, &identity)?;
        let secret = self.local_secret(&identity)?;

        self.session.ensure_unchanged(&identity, epoch)?;
        self.vault.store_with(resource, &key, &secret).await?;
        debug!(resource, holder = %identity, "accepted grant");
        Ok(key)
    }

    /// Delete the local key for `resource`.
    pub async fn forget_resource(&mut self, resource: &str) -> Result<bool> {
        self.session.require_authenticated()?;
        Ok(self.vault.remove(resource).await?)
    }

    /// Resources with a local key.
    pub async fn resources(&self) -> Result<Vec<String>> {
        Ok(self.vault.resources().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn authorized_key(&mut self, resource: &str) -> Result<(Identity, u64, ResourceKey)> {
        validate_resource(resource)?;
        let (identity, epoch) = self.session.require_authenticated()?;
        let secret = self.local_secret(&identity)?;
        let key = self
            .vault
            .retrieve_with(resource, &secret)
            .await?
            .ok_or_else(|| CoordinatorError::ResourceNotFound(resource.to_string()))?;
        Ok((identity, epoch, key))
    }

    async fn submit_grant(
        &mut self,
        identity: &Identity,
        epoch: u64,
        grantee: &Identity,
        resource: &str,
        wrapped: Vec<u8>,
    ) -> Result<GrantOutcome> {
        self.session.ensure_unchanged(identity, epoch)?;

        let ledger = Arc::clone(self.session.ledger());
        match ledger.grant_access(identity, grantee, resource, &wrapped).await {
            Ok(tx) => {
                info!(resource, grantee = %grantee, block = tx.block, "access granted");
                Ok(GrantOutcome::Granted { tx, wrapped })
            }
            Err(LedgerError::Rejected(reason)) => {
                warn!(resource, grantee = %grantee, %reason, "grant rejected");
                Ok(GrantOutcome::Rejected { reason })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn has_vault_secret(&self, identity: &Identity) -> bool {
        matches!(&self.vault_secret, Some((held, _)) if held == identity)
    }

    /// The wrapping secret for local entries. Never prompts the wallet.
    fn local_secret(&self, identity: &Identity) -> Result<WrappingSecret> {
        match (&self.config.wrapping, &self.vault_secret) {
            (WrappingMode::IdentityDerived, _) => Ok(WrappingSecret::from_identity(identity)),
            (WrappingMode::SignatureDerived, Some((held, secret))) if held == identity => {
                Ok(secret.clone())
            }
            (WrappingMode::SignatureDerived, _) => Err(CoordinatorError::VaultLocked),
        }
    }

    async fn obtain_vault_secret(&mut self, identity: &Identity, cancel: &mut Cancellation) -> Result<()> {
        if self.config.wrapping == WrappingMode::SignatureDerived && !self.has_vault_secret(identity) {
            let secret = self.sign_vault_message(identity, cancel).await?;
            self.vault_secret = Some((identity.clone(), secret));
        }
        Ok(())
    }

    async fn sign_vault_message(
        &self,
        identity: &Identity,
        cancel: &mut Cancellation,
    ) -> Result<WrappingSecret> {
        let message = vault_secret_message(identity);
        let wallet = self.session.wallet();

        let signed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HandshakeError::UserCancelled.into()),
            signed = wallet.sign(identity, &message) => signed,
        };

        let signature = signed.map_err(|e| match e {
            WalletError::UserRejected => HandshakeError::UserCancelled,
            other => HandshakeError::SigningError(other.to_string()),
        })?;
        debug!(identity = %identity, "derived vault secret from signature");
        Ok(WrappingSecret::from_signature(identity, &signature))
    }
}

//! Authorization gate for mutating requests.
//!
//! A grant is a hex `HMAC-SHA256(signing_key, "<vid>,<key><cookie>")` bound
//! to exactly one file id. Clients present it as `Authorization: Bearer
//! <grant>` or as the `jwt` query parameter.

use awl_types::VolumeId;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Caller identity extracted by the protocol adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Bearer grant, if any.
    pub token: Option<String>,
    /// Remote address, for logging.
    pub remote_addr: Option<String>,
}

impl RequestContext {
    /// Context with no grant and no known address.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Attach a bearer grant.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach the remote address.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }
}

/// Decides whether a request may touch a file id.
pub trait CapabilityVerifier: Send + Sync {
    /// Return `true` if `ctx` is allowed to access `fid` on `volume_id`.
    ///
    /// `fid` is the textual file id (`"3,01637037d6"`). Non-mutating
    /// accesses are checked with `mutating = false`.
    fn check(&self, volume_id: VolumeId, fid: &str, mutating: bool, ctx: &RequestContext) -> bool;
}

/// Verifier for clusters without a signing key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CapabilityVerifier for AllowAll {
    fn check(&self, _: VolumeId, _: &str, _: bool, _: &RequestContext) -> bool {
        true
    }
}

/// Verifier for HMAC grants issued with a shared signing key.
pub struct SignedGrantVerifier {
    key: Vec<u8>,
}

impl SignedGrantVerifier {
    /// Create a verifier for grants signed with `key`.
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Issue a grant for `fid`. Mostly useful for tests and tooling.
    pub fn sign(&self, fid: &str) -> String {
        sign_grant(&self.key, fid)
    }
}

impl CapabilityVerifier for SignedGrantVerifier {
    fn check(&self, volume_id: VolumeId, fid: &str, mutating: bool, ctx: &RequestContext) -> bool {
        if !mutating {
            return true;
        }
        // The grant must name the same volume the request is routed to.
        let Some((vid, _)) = fid.split_once(',') else {
            return false;
        };
        if vid.parse::<VolumeId>().ok() != Some(volume_id) {
            return false;
        }
        let Some(token) = ctx.token.as_deref() else {
            return false;
        };

        let expected = sign_grant(&self.key, fid);
        expected.as_bytes().ct_eq(token.as_bytes()).into()
    }
}

/// Compute the grant for `fid` under `key`.
pub fn sign_grant(key: &[u8], fid: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(fid.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

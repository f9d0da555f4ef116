use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::core::Error;
use crate::net::{Endpoint, Link, Psk};

/// What a cached session was established for.
///
/// A request whose key differs from the cached session's
/// replaces the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
  /// the gateway
  pub endpoint: Endpoint,
  /// the PSK identity we authenticated as
  pub identity: String,
}

impl SessionKey {
  /// Key for a session to `endpoint` authenticated with `psk`
  pub fn new(endpoint: &Endpoint, psk: &Psk) -> Self {
    Self { endpoint: endpoint.clone(),
           identity: psk.identity.clone() }
  }
}

/// An established DTLS session.
///
/// The link owns both the UDP socket and the DTLS state, so
/// a session is either wholly usable or not there at all.
#[derive(Debug)]
pub struct Session<L> {
  key: SessionKey,
  link: L,
  established: Instant,
  last_used: Instant,
}

impl<L: Link> Session<L> {
  fn new(key: SessionKey, link: L) -> Self {
    let now = Instant::now();
    Self { key,
           link,
           established: now,
           last_used: now }
  }

  fn reusable(&self, key: &SessionKey, idle_lifetime: Duration) -> bool {
    &self.key == key && self.last_used.elapsed() < idle_lifetime
  }

  fn teardown(mut self) {
    log::debug!("shutting down session with {} (up {:?})",
                self.key.endpoint,
                self.established.elapsed());
    self.link.shutdown();
  }
}

/// Holds the (at most one) cached DTLS session.
///
/// Every access goes through [`SessionCache::lock`], so only one
/// exchange can use the session at a time and creation / teardown
/// never race.
#[derive(Debug)]
pub struct SessionCache<L> {
  slot: Mutex<Option<Session<L>>>,
  idle_lifetime: Duration,
  invalidations: AtomicUsize,
  handshakes: AtomicUsize,
}

/// Exclusive access to the session cache
#[derive(Debug)]
pub struct Sessions<'a, L> {
  slot: MutexGuard<'a, Option<Session<L>>>,
  cache: &'a SessionCache<L>,
}

impl<L: Link> SessionCache<L> {
  /// Create an empty cache whose sessions expire after
  /// `idle_lifetime` without use
  pub fn new(idle_lifetime: Duration) -> Self {
    Self { slot: Mutex::new(None),
           idle_lifetime,
           invalidations: AtomicUsize::new(0),
           handshakes: AtomicUsize::new(0) }
  }

  /// Wait for exclusive access to the cache
  pub fn lock(&self) -> Sessions<'_, L> {
    // the slot only ever holds a whole session or nothing,
    // so a panic elsewhere cannot have left it half-written
    Sessions { slot: self.slot.lock().unwrap_or_else(PoisonError::into_inner),
               cache: self }
  }

  /// Is there no cached session right now?
  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// How many times a session was torn down because it failed
  pub fn invalidations(&self) -> usize {
    self.invalidations.load(Ordering::SeqCst)
  }

  /// How many sessions were established
  pub fn handshakes(&self) -> usize {
    self.handshakes.load(Ordering::SeqCst)
  }
}

impl<'a, L: Link> Sessions<'a, L> {
  /// Get the cached session for `key`, dialing a new one if
  /// there is none, the cached one is for a different key, or
  /// the cached one has been idle too long.
  pub fn get_or_create(&mut self,
                       key: &SessionKey,
                       dial: impl FnOnce() -> Result<L, Error>)
                       -> Result<&mut L, Error> {
    let session = match self.slot.take() {
      | Some(cached) if cached.reusable(key, self.cache.idle_lifetime) => {
        self.slot.insert(cached)
      },
      | stale => {
        if let Some(stale) = stale {
          log::debug!("cached session is stale or for another gateway");
          stale.teardown();
        }

        let link = dial()?;
        self.cache.handshakes.fetch_add(1, Ordering::SeqCst);
        log::debug!("established session with {}", key.endpoint);
        self.slot.insert(Session::new(key.clone(), link))
      },
    };

    session.last_used = Instant::now();
    Ok(&mut session.link)
  }

  /// Shut the cached session down and forget it.
  ///
  /// The next [`Sessions::get_or_create`] performs a fresh handshake.
  pub fn invalidate(&mut self) {
    if let Some(session) = self.slot.take() {
      self.cache.invalidations.fetch_add(1, Ordering::SeqCst);
      session.teardown();
    }
  }

  /// Is there no cached session?
  pub fn is_empty(&self) -> bool {
    self.slot.is_none()
  }
}

//! Shared pool tuning for every compiled-in backend.

use sqlx::Database;
use sqlx::pool::PoolOptions;

use crate::ConnectOpts;

pub trait ApplyPoolOpts {
    fn apply(self, opts: &ConnectOpts) -> Self;
}

impl<DB: Database> ApplyPoolOpts for PoolOptions<DB> {
    fn apply(mut self, opts: &ConnectOpts) -> Self {
        if let Some(n) = opts.max_conns {
            self = self.max_connections(n);
        }
        if let Some(n) = opts.min_conns {
            self = self.min_connections(n);
        }
        if let Some(t) = opts.acquire_timeout {
            self = self.acquire_timeout(t);
        }
        // Unset idle/lifetime limits keep the sqlx defaults.
        if let Some(t) = opts.idle_timeout {
            self = self.idle_timeout(t);
        }
        if let Some(t) = opts.max_lifetime {
            self = self.max_lifetime(t);
        }
        self.test_before_acquire(opts.test_before_acquire)
    }
}

//! Demo service - manage demo mode
//!
//! Demo mode runs the app against the in-memory backend seeded with sample
//! todos, so it can be tried without a Supabase project. The demo data lives
//! only for the life of the process.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::{self, Config};

pub struct DemoService {
    dir: PathBuf,
}

impl DemoService {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn is_enabled(&self) -> Result<bool> {
        Ok(Config::load(&self.dir)?.demo_mode)
    }

    /// Turn demo mode on
    ///
    /// Any saved sign-in belongs to the real backend and is cleared.
    pub fn enable(&self) -> Result<()> {
        self.set(true)
    }

    /// Turn demo mode off and clear the saved demo sign-in
    pub fn disable(&self) -> Result<()> {
        self.set(false)
    }

    fn set(&self, enabled: bool) -> Result<()> {
        let mut config = Config::load(&self.dir).unwrap_or_default();
        if enabled {
            config.enable_demo_mode();
        } else {
            config.disable_demo_mode();
        }
        config.save(&self.dir)?;
        config::save_session(&self.dir, None)
    }
}

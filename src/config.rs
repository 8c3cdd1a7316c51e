use super::{
    errors::ConfigError,
    result::ConfigResult,
};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_PADDING: usize = 50;
pub const DEFAULT_MAX_PRELOAD: usize = 1000;

// How many page sizes a single request may always cover, whatever max_preload says
const PAGES_ALWAYS_ALLOWED: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    // Rows per provider fetch, also the alignment unit of viewport ranges
    pub page_size: usize,
    // Rows kept loaded on each side of the visible range
    pub padding: usize,
    // Safety ceiling for a single viewport preload
    pub max_preload: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            padding: DEFAULT_PADDING,
            max_preload: DEFAULT_MAX_PRELOAD,
        }
    }
}

impl WindowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_max_preload(mut self, max_preload: usize) -> Self {
        self.max_preload = max_preload;
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.max_preload < self.page_size {
            return Err(ConfigError::PreloadBelowPage {
                max_preload: self.max_preload,
                page_size: self.page_size,
            });
        }
        Ok(())
    }

    // Effective ceiling: large page sizes raise it so one page is never rejected
    #[inline]
    pub fn preload_ceiling(&self) -> usize {
        self.max_preload.max(self.page_size.saturating_mul(PAGES_ALWAYS_ALLOWED))
    }

    #[inline]
    pub fn align_down(&self, index: usize) -> usize {
        index - index % self.page_size
    }

    #[inline]
    pub fn align_up(&self, index: usize) -> usize {
        match index % self.page_size {
            0 => index,
            rem => index.saturating_add(self.page_size - rem),
        }
    }
}

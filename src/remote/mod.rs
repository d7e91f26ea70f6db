//! Remote-browser mode.
//!
//! Sites that refuse framing even through the proxy can be driven in a
//! server-side browser and shown to the portal as screenshots.
//!
//! # Data Flow
//! ```text
//! POST /api/session {url}
//!     → session.rs (register, status = initializing)
//!     → spawned open via driver.rs (BrowserDriver)
//!         → webdriver.rs (W3C WebDriver over HTTP)
//!     → status = ready | error
//!
//! frame / action → session.rs → driver
//! idle sweep     → session.rs → driver.close
//! ```

pub mod driver;
pub mod session;
pub mod webdriver;

pub use driver::{BrowserAction, BrowserDriver, BrowserHandle, SessionError, Viewport};
pub use session::{SessionInfo, SessionManager, SessionStatus};
pub use webdriver::WebDriverBrowser;

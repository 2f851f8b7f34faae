pub mod browser;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use browser::BrowserSession;
#[cfg(any(test, feature = "fixtures"))]
pub use fixture::FixtureDocument;

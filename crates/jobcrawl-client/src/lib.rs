pub mod board;
pub mod cleaner;
pub mod fetcher;
pub mod profile;

pub use board::HtmlBoardBackend;
pub use cleaner::HtmdCleaner;
pub use fetcher::ReqwestFetcher;
pub use profile::BoardProfile;

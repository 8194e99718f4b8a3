pub mod channel;
pub mod guide;
pub mod provider;

pub use channel::Channel;
pub use guide::{Airing, AiringStream, Guide, GuideEntry, GuideEntryStream, GuideWindow};
pub use provider::ProviderInfo;

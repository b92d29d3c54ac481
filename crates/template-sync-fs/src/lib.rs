mod provider;

pub use provider::FsTemplatesProvider;

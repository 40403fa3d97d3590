pub mod mock_openai_server;

pub use mock_openai_server::MockOpenAIServer;

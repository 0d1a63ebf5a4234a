pub mod dynamo_test_utils;
pub mod http_test_utils;
pub mod mock_event_store;
pub mod mock_push_token_store;
pub mod test_logging;

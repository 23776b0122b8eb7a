use biometrics::{Collector, Counter, Moments};

pub(crate) static CHAT_TURNS: Counter = Counter::new("colloquy.chat.turns");
pub(crate) static CHAT_STREAMING_TURNS: Counter = Counter::new("colloquy.chat.streaming_turns");
pub(crate) static CHAT_GENERATION_ERRORS: Counter =
    Counter::new("colloquy.chat.generation_errors");
pub(crate) static CHAT_CANCELLED: Counter = Counter::new("colloquy.chat.cancelled");
pub(crate) static CHAT_TURN_DURATION: Moments =
    Moments::new("colloquy.chat.turn_duration_seconds");

pub(crate) static RELAY_INCREMENTS: Counter = Counter::new("colloquy.relay.increments");
pub(crate) static RELAY_BYTES: Counter = Counter::new("colloquy.relay.bytes");
pub(crate) static RELAY_STREAM_ERRORS: Counter = Counter::new("colloquy.relay.stream_errors");
pub(crate) static RELAY_HANGUPS: Counter = Counter::new("colloquy.relay.hangups");
pub(crate) static RELAY_CANCELLED: Counter = Counter::new("colloquy.relay.cancelled");
pub(crate) static RELAY_CONSUMER_GONE: Counter = Counter::new("colloquy.relay.consumer_gone");
pub(crate) static RELAY_PERSIST_ERRORS: Counter = Counter::new("colloquy.relay.persist_errors");
pub(crate) static RELAY_STREAM_DURATION: Moments =
    Moments::new("colloquy.relay.stream_duration_seconds");

pub(crate) static HISTORY_APPENDS: Counter = Counter::new("colloquy.history.appends");
pub(crate) static HISTORY_APPEND_ERRORS: Counter = Counter::new("colloquy.history.append_errors");

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("colloquy.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("colloquy.client.request_errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CHAT_TURNS);
    collector.register_counter(&CHAT_STREAMING_TURNS);
    collector.register_counter(&CHAT_GENERATION_ERRORS);
    collector.register_counter(&CHAT_CANCELLED);
    collector.register_moments(&CHAT_TURN_DURATION);

    collector.register_counter(&RELAY_INCREMENTS);
    collector.register_counter(&RELAY_BYTES);
    collector.register_counter(&RELAY_STREAM_ERRORS);
    collector.register_counter(&RELAY_HANGUPS);
    collector.register_counter(&RELAY_CANCELLED);
    collector.register_counter(&RELAY_CONSUMER_GONE);
    collector.register_counter(&RELAY_PERSIST_ERRORS);
    collector.register_moments(&RELAY_STREAM_DURATION);

    collector.register_counter(&HISTORY_APPENDS);
    collector.register_counter(&HISTORY_APPEND_ERRORS);

    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
}

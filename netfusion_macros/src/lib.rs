mod message;

use proc_macro::TokenStream;

use message::MessageRole;

// ============================================================================
// Message derives
// ============================================================================

/// Derive `netfusion::Message` + `netfusion::Command` for a struct.
///
/// # Usage
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Command)]
/// #[message(output = OrderConfirmation)]
/// pub struct PlaceOrder {
///     pub order_id: String,
/// }
/// ```
///
/// Supported `#[message(...)]` keys:
/// - `name = "..."`: logical message name used on the wire. Defaults to the struct name.
/// - `output = Type`: the command result type. Defaults to `()`.
/// - `route_key = "field"`: field whose `to_string()` becomes the broker route key.
#[proc_macro_derive(Command, attributes(message))]
pub fn derive_command(input: TokenStream) -> TokenStream {
    message::derive_message(input, MessageRole::Command)
}

/// Derive `netfusion::Message` + `netfusion::DomainEvent` for a struct.
///
/// Accepts the same `#[message(name = "...", route_key = "field")]` keys as
/// `Command`; `output` is rejected because events carry no result.
#[proc_macro_derive(DomainEvent, attributes(message))]
pub fn derive_domain_event(input: TokenStream) -> TokenStream {
    message::derive_message(input, MessageRole::DomainEvent)
}

/// Derive `netfusion::Message` + `netfusion::Query` for a struct.
///
/// `output = Type` is required: every query returns a result.
#[proc_macro_derive(Query, attributes(message))]
pub fn derive_query(input: TokenStream) -> TokenStream {
    message::derive_message(input, MessageRole::Query)
}

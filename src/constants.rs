/// Status recorded for every delivery when it is first ingested.
pub const STATUS_RECEIVED: &str = "Pedido recebido e em processamento.";

/// Timeline events whose status starts with this prefix mark the delivery as
/// finalized for metrics purposes.
pub const STATUS_DELIVERED_PREFIX: &str = "Entrega realizada";

/// Length of a cleaned NF-e invoice key (digits only).
pub const INVOICE_KEY_LEN: usize = 44;

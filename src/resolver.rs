use crate::classify::classify;
use crate::cli::ClientConfig;
use crate::contact::{Exchange, Reply, Transport};
use crate::dns::Query;
use crate::types::{DnsError, Response};
use random::Source;
use tracing::{debug, info};

/// Everything one lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The raw reply and its timing, when one arrived.
    pub reply: Option<Reply>,
    /// The accepted response, or why there is none.
    pub outcome: Result<Response, DnsError>,
}

impl Resolution {
    fn failed(reply: Option<Reply>, err: DnsError) -> Self {
        Resolution { reply, outcome: Err(err) }
    }
}

/// Performs one query/response round trip as described by `config`.
///
/// Build the query, exchange it (retrying only on timeout), decode the reply
/// and classify it against the query. Nothing is printed here.
pub async fn resolve<T: Transport, S: Source>(
    config:    &ClientConfig,
    transport: T,
    source:    &mut S,
) -> Resolution {
    let query = match Query::with_source(&config.name, config.query_type, source) {
        Ok(query) => query,
        Err(e) => return Resolution::failed(None, e),
    };
    let payload = match query.encode() {
        Ok(bytes) => bytes,
        Err(e) => return Resolution::failed(None, e),
    };
    debug!(id = query.id(), name = %config.name, qtype = %config.query_type, "query built");

    let mut exchange = match Exchange::new(transport, config.server, config.timeout, config.max_retries) {
        Ok(exchange) => exchange,
        Err(e) => return Resolution::failed(None, e),
    };
    let reply = match exchange.send(&payload).await {
        Ok(reply) => reply,
        Err(e) => return Resolution::failed(None, e),
    };

    let outcome = Response::decode(&reply.bytes).and_then(|response| {
        classify(&query, &response)?;
        Ok(response)
    });

    match &outcome {
        Ok(response) => info!(
            answers = response.answers.len(),
            additionals = response.additionals.len(),
            discarded = response.discarded,
            "response accepted"
        ),
        Err(e) => info!(error = %e, "response rejected"),
    }

    Resolution { reply: Some(reply), outcome }
}

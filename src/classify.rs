use crate::dns::Query;
use crate::types::{DnsError, Response, ResponseCode};
use tracing::warn;

/// Checks a decoded response against the query that produced it.
///
/// Checks run in a fixed order and the first failure wins: transaction id,
/// QR, RA, then the response code. `Ok` means the answer may be presented.
pub fn classify<'r>(query: &Query, response: &'r Response) -> Result<&'r Response, DnsError> {
    let header = &response.header;

    if header.id != query.id() {
        return Err(DnsError::UnexpectedResponse(format!(
            "id mismatch: sent {:#06x}, received {:#06x}",
            query.id(),
            header.id
        )));
    }
    if !header.flags.qr {
        return Err(DnsError::UnexpectedResponse("not a response".into()));
    }
    if !header.flags.ra {
        return Err(DnsError::UnexpectedResponse("server lacks recursion support".into()));
    }
    if header.flags.tc {
        warn!(id = header.id, "response was truncated; records may be missing");
    }

    match ResponseCode::from(header.flags.rcode) {
        ResponseCode::NoError        => Ok(response),
        ResponseCode::FormatError    => Err(DnsError::FormatError),
        ResponseCode::ServerFailure  => Err(DnsError::ServerFailure),
        ResponseCode::NameNotFound   => Err(DnsError::NameNotFound),
        ResponseCode::NotImplemented => Err(DnsError::NotImplemented),
        ResponseCode::Refused        => Err(DnsError::Refused),
        ResponseCode::Other(code)    => Err(DnsError::UnexpectedResponse(format!(
            "unsupported response code {code}"
        ))),
    }
}

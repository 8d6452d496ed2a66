use crate::cli::ClientConfig;
use crate::resolver::Resolution;
use crate::types::{DnsError, RData, ResourceRecord, Response};

/// Renders one record as a tab-separated line, or `None` for types this
/// client does not display.
///
/// The authority tag comes from the header's AA bit and is the same for every
/// record of a response.
pub fn record_line(record: &ResourceRecord, authoritative: bool) -> Option<String> {
    let auth = if authoritative { "auth" } else { "nonauth" };
    let ttl = record.ttl;

    match &record.rdata {
        RData::A(ip)        => Some(format!("IP\t{ip}\t{ttl}\t{auth}")),
        RData::NS(name)     => Some(format!("NS\t{name}\t{ttl}\t{auth}")),
        RData::CNAME(name)  => Some(format!("CNAME\t{name}\t{ttl}\t{auth}")),
        RData::MX { preference, exchange } => {
            Some(format!("MX\t{exchange}\t{preference}\t{ttl}\t{auth}"))
        }
        RData::Unknown(_)   => None,
    }
}

fn section_lines(records: &[ResourceRecord], authoritative: bool) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| record_line(r, authoritative))
        .collect()
}

/// Answer then Additional records of an accepted response.
pub fn answer_lines(response: &Response) -> Vec<String> {
    let aa = response.header.flags.aa;
    let answers = section_lines(&response.answers, aa);
    let additionals = section_lines(&response.additionals, aa);

    let mut lines = Vec::with_capacity(answers.len() + additionals.len() + 2);
    if answers.is_empty() {
        lines.push("NOTFOUND".to_string());
    } else {
        lines.push(format!("***Answer Section ({} records)***", answers.len()));
        lines.extend(answers);
    }
    if !additionals.is_empty() {
        lines.push(format!("***Additional Section ({} records)***", additionals.len()));
        lines.extend(additionals);
    }
    lines
}

/// The single line shown for a failed lookup.
pub fn error_line(err: &DnsError) -> String {
    match err {
        DnsError::NameNotFound => "NOTFOUND".to_string(),
        other => format!("ERROR\t{other}"),
    }
}

/// Full report for one lookup, line by line.
pub fn report(config: &ClientConfig, resolution: &Resolution) -> Vec<String> {
    let mut lines = vec![
        format!("DnsClient sending request for {}", config.name),
        format!("Server: {}", config.server.ip()),
        format!("Request type: {}", config.query_type),
    ];

    if let Some(reply) = &resolution.reply {
        lines.push(format!(
            "Response received after {:.3} seconds ({} retries)",
            reply.elapsed.as_secs_f64(),
            reply.retries()
        ));
    }

    match &resolution.outcome {
        Ok(response) => lines.extend(answer_lines(response)),
        Err(err) => lines.push(error_line(err)),
    }
    lines
}

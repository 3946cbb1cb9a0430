use std::collections::HashMap;

pub const ERR_MALFORMEDXML: &str = "ERR_MALFORMEDXML";
pub const ERR_EMPTY_RESPONSE: &str = "ERR_EMPTY_RESPONSE";
pub const ERR_ITEM_ID_NOTFOUND: &str = "ERR_ITEM_ID_NOTFOUND";
pub const ERR_PPR_INSERTBEFID: &str = "ERR_PPR_INSERTBEFID";
pub const ERR_PPR_UNKNOWNCID: &str = "ERR_PPR_UNKNOWNCID";
pub const ERR_REQU_FAILED: &str = "ERR_REQU_FAILED";
pub const ERR_TIMEOUT: &str = "ERR_TIMEOUT";
pub const ERR_NETWORK: &str = "ERR_NETWORK";
pub const ERR_NO_PARITEM: &str = "ERR_NO_PARITEM";
pub const ERR_SERVER: &str = "ERR_SERVER";

/// Source of user-facing error text.
pub trait MessageSource {
    fn message(&self, key: &str, args: &[&str]) -> String;
}

pub struct DefaultMessages {
    bundle: HashMap<&'static str, &'static str>,
}

impl Default for DefaultMessages {
    fn default() -> Self {
        let bundle = HashMap::from([
            (
                ERR_MALFORMEDXML,
                "The server response could not be parsed, the server has returned a response that is not well-formed XML",
            ),
            (ERR_EMPTY_RESPONSE, "The response of request {0} was empty"),
            (ERR_ITEM_ID_NOTFOUND, "Item with id {0} not found"),
            (ERR_PPR_INSERTBEFID, "Insert reference id {0} not found"),
            (ERR_PPR_UNKNOWNCID, "Unknown html component id {0}"),
            (
                ERR_REQU_FAILED,
                "Request failed with status {0} and reason {1}",
            ),
            (ERR_TIMEOUT, "Request {0} timed out"),
            (ERR_NETWORK, "Request {0} failed: {1}"),
            (ERR_NO_PARITEM, "No parent form could be found for element {0}"),
            (ERR_SERVER, "Server error {0}: {1}"),
        ]);
        Self { bundle }
    }
}

impl MessageSource for DefaultMessages {
    fn message(&self, key: &str, args: &[&str]) -> String {
        match self.bundle.get(key) {
            Some(template) => format_message(template, args),
            None => key.to_string(),
        }
    }
}

/// Substitutes `{n}` placeholders; placeholders without an argument stay as written.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let substituted = after.find('}').and_then(|end| {
            let index: usize = after[..end].parse().ok()?;
            let value = args.get(index)?;
            Some((value, end))
        });
        match substituted {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

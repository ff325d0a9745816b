//! URI command implementation.

use strata_protocol::QueryStringBuilder;
use url::Url;

/// Merges `name=value` (or bare `name`) parameters into `base`.
pub fn build(base: &str, params: &[String]) -> Result<Url, Box<dyn std::error::Error>> {
    let mut builder = QueryStringBuilder::new();
    for param in params {
        match param.split_once('=') {
            Some((name, value)) => builder.add(name, Some(value))?,
            None => builder.add(param, None)?,
        }
    }
    Ok(builder.merge_into(base)?)
}

/// Runs the uri command.
pub fn run(base: &str, params: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", build(base, params)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_and_escapes() {
        let url = build(
            "https://acct.table.example.net/people()?existing=1",
            &["$filter=a eq 'b'".to_string(), "flag".to_string()],
        )
        .unwrap();
        let query = url.query().unwrap();
        assert!(query.starts_with("existing=1&"));
        assert!(query.contains("%20eq%20"));
        assert!(query.ends_with("flag"));
    }

    #[test]
    fn duplicate_names_fail() {
        let params = ["a=1".to_string(), "a=2".to_string()];
        assert!(build("https://acct.table.example.net/", &params).is_err());
    }

    #[test]
    fn relative_base_fails() {
        assert!(build("people()", &[]).is_err());
    }
}

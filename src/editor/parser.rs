use anyhow::{anyhow, Result};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "editor/script.pest"]
pub struct ScriptParser;

#[derive(Debug, PartialEq)]
pub enum Token<'a> {
    Key(&'a str),
    KeyValue(&'a str, &'a str),
}

/// Returns the text of a value, without the quotes for a quoted one
fn unquote(value: Pair<'_, Rule>) -> Result<&str> {
    match value.as_rule() {
        Rule::plain_value => Ok(value.as_str()),
        Rule::quoted_value => value
            .into_inner()
            .next()
            .map(|inner| inner.as_str())
            .ok_or_else(|| anyhow!("empty quoted value")),
        r => Err(anyhow!("unexpected rule {:?} in value", r)),
    }
}

/// Splits one script line into [Token]s
pub fn tokenize_line(line: &str) -> Result<Vec<Token<'_>>> {
    let line = ScriptParser::parse(Rule::line, line)?
        .next()
        .ok_or_else(|| anyhow!("empty line"))?;

    let mut result: Vec<Token> = Vec::new();

    for l in line.into_inner() {
        match l.as_rule() {
            Rule::item => {
                let item = l.into_inner().next().ok_or_else(|| anyhow!("empty item"))?;

                match item.as_rule() {
                    Rule::key => result.push(Token::Key(item.as_str())),
                    Rule::quoted_value => result.push(Token::Key(unquote(item)?)),
                    Rule::key_value => {
                        let mut inner = item.into_inner();

                        let key = inner
                            .next()
                            .ok_or_else(|| anyhow!("missing key"))?
                            .as_str();

                        // `value` wraps either a plain or a quoted value
                        let value = inner
                            .next()
                            .and_then(|v| v.into_inner().next())
                            .ok_or_else(|| anyhow!("missing value for {}", key))?;

                        result.push(Token::KeyValue(key, unquote(value)?));
                    }
                    r => return Err(anyhow!("unexpected item type {:?}", r)),
                }
            }
            Rule::EOI => {}
            r => return Err(anyhow!("unexpected rule {:?}", r)),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::{tokenize_line, Token};
    use assert2::check;
    use rstest::rstest;

    #[test]
    fn test_tokenize_line() {
        check!(tokenize_line("").is_err());
        check!(tokenize_line("=").is_err());
        check!(tokenize_line("name=").is_err());

        let res = tokenize_line("policy new").unwrap();
        check!(res == vec![Token::Key("policy"), Token::Key("new")]);

        let res = tokenize_line("set name=web comment=\"staff web access\" nat=enable").unwrap();
        check!(
            res == vec![
                Token::Key("set"),
                Token::KeyValue("name", "web"),
                Token::KeyValue("comment", "staff web access"),
                Token::KeyValue("nat", "enable"),
            ]
        );
    }

    #[rstest]
    #[case("address src set 1 address_group:office", "address_group:office")]
    #[case("policy select #1", "#1")]
    #[case("import-catalog ../device.conf", "../device.conf")]
    #[case("service set 0 \"group:Web Access\"", "group:Web Access")]
    fn test_last_key(#[case] line: &str, #[case] expected: &str) {
        let res = tokenize_line(line).unwrap();
        check!(res.last() == Some(&Token::Key(expected)));
    }

    #[test]
    fn test_empty_quoted_value() {
        let res = tokenize_line("form comment=\"\"").unwrap();
        check!(res[1] == Token::KeyValue("comment", ""));
    }
}

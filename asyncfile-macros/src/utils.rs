use proc_macro::{TokenStream, TokenTree};

/// Options accepted by `#[asyncfile::test(...)]`.
#[derive(Default)]
pub(crate) struct TestOptions {
    pub(crate) worker_threads: Option<usize>,
    pub(crate) timeout_ms: Option<u64>,
}

/// Parses `name = integer` options separated by commas.
pub(crate) fn parse_options(attr: TokenStream) -> Result<TestOptions, String> {
    let mut options = TestOptions::default();
    let mut tokens = attr.into_iter();

    while let Some(token) = tokens.next() {
        let name = match token {
            TokenTree::Ident(name) => name.to_string(),
            other => return Err(format!("expected an option name, found `{other}`")),
        };

        match tokens.next() {
            Some(TokenTree::Punct(p)) if p.as_char() == '=' => {}
            _ => return Err(format!("expected `=` after `{name}`")),
        }

        let value = match tokens.next() {
            Some(TokenTree::Literal(value)) => value.to_string(),
            _ => return Err(format!("expected an integer after `{name} =`")),
        };

        match name.as_str() {
            "worker_threads" => {
                let n = integer::<usize>(&name, &value)?;
                if n == 0 {
                    return Err("worker_threads must be at least 1".to_owned());
                }
                options.worker_threads = Some(n);
            }
            "timeout_ms" => options.timeout_ms = Some(integer::<u64>(&name, &value)?),
            other => {
                return Err(format!(
                    "unknown option `{other}`, expected `worker_threads` or `timeout_ms`"
                ));
            }
        }

        match tokens.next() {
            None => break,
            Some(TokenTree::Punct(p)) if p.as_char() == ',' => {}
            Some(other) => return Err(format!("expected `,` between options, found `{other}`")),
        }
    }

    Ok(options)
}

fn integer<T: std::str::FromStr>(name: &str, literal: &str) -> Result<T, String> {
    literal
        .replace('_', "")
        .parse()
        .map_err(|_| format!("`{name}` takes an integer, found `{literal}`"))
}

/// Expands to a `compile_error!` with `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}

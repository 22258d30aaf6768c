mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Runs a test body on a fresh runtime context and waits for completion.
///
/// ```rust,ignore
/// #[asyncfile::test]
/// fn writes_then_closes(done: Done) {
///     let file = OpenOptions::new().write(true).create(true).open(path).unwrap();
///     file.close_with(move |result| {
///         result.unwrap();
///         done.complete();
///     })
///     .unwrap();
/// }
/// ```
///
/// The function's single parameter receives the completion handle; the
/// test fails if it is not completed in time or if anything panics on
/// the event loop. A parameterless body completes when it returns.
///
/// Options: `worker_threads = N`, `timeout_ms = N`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = match utils::parse_options(attr) {
        Ok(options) => options,
        Err(message) => return utils::compile_error(&message),
    };

    let mut tokens = item.into_iter().collect::<Vec<_>>();

    if tokens
        .iter()
        .any(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        return utils::compile_error("#[asyncfile::test] functions must not be async");
    }

    let Some(fn_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "fn"))
    else {
        return utils::compile_error("#[asyncfile::test] must be used on a function");
    };

    let Some(params_pos) = tokens[fn_pos..]
        .iter()
        .position(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Parenthesis))
        .map(|offset| fn_pos + offset)
    else {
        return utils::compile_error("#[asyncfile::test] could not find the parameter list");
    };

    let params = match &tokens[params_pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let Some(body_pos) = tokens.iter().rposition(
        |t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace),
    ) else {
        return TokenStream::new();
    };

    let body = match &tokens[body_pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let (closure_params, body) = if params.trim().is_empty() {
        (
            "__asyncfile_done".to_owned(),
            format!("{{ {body} }} __asyncfile_done.complete();"),
        )
    } else {
        (params, body)
    };

    let mut builder = String::from("::asyncfile::RuntimeBuilder::new()");

    if let Some(n) = options.worker_threads {
        builder.push_str(&format!(".worker_threads({n})"));
    }

    builder.push_str(".build()");

    let timeout = match options.timeout_ms {
        Some(ms) => format!("::std::time::Duration::from_millis({ms})"),
        None => "::asyncfile::runtime::DEFAULT_COMPLETION_TIMEOUT".to_owned(),
    };

    let new_block = format!(
        "{{
        let runtime = {builder};
        runtime.run_until_complete_timeout({timeout}, move |{closure_params}| {{ {body} }});
    }}"
    );

    let Ok(new_block) = new_block.parse::<TokenStream>() else {
        return utils::compile_error("#[asyncfile::test] failed to expand the test body");
    };

    tokens[body_pos] = TokenTree::Group(Group::new(Delimiter::Brace, new_block));
    tokens[params_pos] = TokenTree::Group(Group::new(Delimiter::Parenthesis, TokenStream::new()));

    let test_attr: TokenStream = "#[test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}

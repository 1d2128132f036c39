use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Only top-level commas separate arguments; commas nested in a delimited
/// group already live inside a single `TokenTree::Group`.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens into a Rust source string.
///
/// Consecutive identifiers are separated by a space so that `move x`
/// does not turn into `movex`.
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let is_ident = matches!(t, TokenTree::Ident(_));

        if prev_was_ident && is_ident {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = is_ident;
    }

    out
}

/// Returns `true` if the tokens at position `i` form a `=>` arrow.
fn is_arrow(tokens: &[TokenTree], i: usize) -> bool {
    if i + 1 >= tokens.len() {
        return false;
    }

    matches!(
        (&tokens[i], &tokens[i + 1]),
        (TokenTree::Punct(p1), TokenTree::Punct(p2))
            if p1.as_char() == '=' && p2.as_char() == '>'
    )
}

/// Parses `future => handler` branches.
///
/// Returns `(future, handler)` source pairs. Branches without both halves
/// are skipped.
pub(crate) fn parse_select_branches(input: TokenStream) -> Vec<(String, String)> {
    let mut branches = Vec::new();

    for tokens in split_args(input) {
        let split = (0..tokens.len()).find(|&i| is_arrow(&tokens, i));

        let Some(arrow) = split else {
            continue;
        };

        let future = tokens_to_string(&tokens[..arrow]);
        let handler = tokens_to_string(&tokens[arrow + 2..]);

        if !future.trim().is_empty() && !handler.trim().is_empty() {
            branches.push((future, handler));
        }
    }

    branches
}

/// Builds the `LoopBuilder` expression for `#[main]` / `#[test]`.
///
/// Accepted flags: `virtual_time`.
pub(crate) fn loop_builder(attr: TokenStream) -> Result<String, String> {
    let mut builder = String::from("::stepwise::LoopBuilder::new()");

    for arg in split_args(attr) {
        let flag = tokens_to_string(&arg);

        match flag.trim() {
            "virtual_time" => builder.push_str(".virtual_time(true)"),
            other => return Err(format!("unknown stepwise loop option `{other}`")),
        }
    }

    builder.push_str(".build()");
    Ok(builder)
}

/// Rewrites an `async fn` item so that its body runs on a fresh event loop.
///
/// The `async` keyword is removed and the body is wrapped into
/// `builder.block_on(async move { body })`.
pub(crate) fn wrap_body(item: TokenStream, builder: &str, context: &str) -> TokenStream {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    if let Some(pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(pos);
    }

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return compile_error(&format!("{context} expects a function with a body"));
    };

    let TokenTree::Group(body) = &tokens[pos] else {
        return compile_error(&format!("{context} expects a function with a body"));
    };

    let new_body = format!(
        "{{
            let event_loop = {builder};
            event_loop
                .block_on(async move {{ {} }})
                .expect(\"{context}: the event loop stopped before the body completed\")
        }}",
        body.stream()
    );

    match new_body.parse::<TokenStream>() {
        Ok(stream) => tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream)),
        Err(err) => return compile_error(&format!("{context}: {err}")),
    }

    tokens.into_iter().collect()
}

pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}

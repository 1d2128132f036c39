//! Procedural macros for the Stepwise event loop.
//!
//! - [`join!`](macro@join) awaits several futures concurrently,
//! - [`select!`](macro@select) awaits the first of several futures,
//! - [`#[main]`](macro@main) and [`#[test]`](macro@test) run an `async fn`
//!   on a fresh event loop.
//!
//! Operands of `join!` and `select!` go through `IntoFuture`, so tasks and
//! deferred results can be passed directly.

mod utils;

use proc_macro::TokenStream;

/// Awaits every operand concurrently and returns their outputs as a tuple.
///
/// ```rust,ignore
/// let (a, b) = stepwise::join!(task_a, time::sleep(Duration::from_millis(5)));
/// ```
#[proc_macro]
pub fn join(input: TokenStream) -> TokenStream {
    let args = utils::split_args(input);
    let count = args.len();

    if count == 0 {
        return "()".parse().unwrap_or_default();
    }

    if count == 1 {
        let expr = utils::tokens_to_string(&args[0]);
        return format!("::std::future::IntoFuture::into_future({expr}).await")
            .parse()
            .unwrap_or_else(|err| utils::compile_error(&format!("join! macro error: {err}")));
    }

    let mut output = String::from("{\n");

    for (i, expr_tokens) in args.iter().enumerate() {
        let idx = i + 1;
        let expr = utils::tokens_to_string(expr_tokens);
        output.push_str(&format!(
            "let mut __f{idx} = (\
                ::std::boxed::Box::pin(::std::future::IntoFuture::into_future({expr})), \
                ::core::option::Option::None, \
            );\n"
        ));
    }

    output.push_str("::std::future::poll_fn(move |cx| {\n");
    output.push_str("    use ::std::future::Future;\n");
    output.push_str("    use ::std::task::Poll;\n");

    for i in 1..=count {
        output.push_str(&format!(
            "    if __f{i}.1.is_none() {{\n\
                     if let Poll::Ready(val) = __f{i}.0.as_mut().poll(cx) {{\n\
                         __f{i}.1 = ::core::option::Option::Some(val);\n\
                     }}\n\
                 }}\n"
        ));
    }

    let all_done = (1..=count)
        .map(|i| format!("__f{i}.1.is_some()"))
        .collect::<Vec<_>>()
        .join(" && ");

    output.push_str(&format!("    if {all_done} {{\n"));
    output.push_str("        Poll::Ready((\n");
    for i in 1..=count {
        output.push_str(&format!(
            "            match __f{i}.1.take() {{ \
                ::core::option::Option::Some(val) => val, \
                ::core::option::Option::None => ::core::unreachable!(), \
            }},\n"
        ));
    }
    output.push_str("        ))\n");
    output.push_str("    } else {\n");
    output.push_str("        Poll::Pending\n");
    output.push_str("    }\n");
    output.push_str("}).await\n");
    output.push_str("}\n");

    output
        .parse()
        .unwrap_or_else(|err| utils::compile_error(&format!("join! macro error: {err}")))
}

/// Awaits the first operand to complete and passes its output to the
/// matching handler. The other operands are dropped.
///
/// ```rust,ignore
/// let winner = stepwise::select!(
///     fast => |out| out.map(|()| "fast"),
///     slow => |out| out.map(|()| "slow"),
/// );
/// ```
#[proc_macro]
pub fn select(input: TokenStream) -> TokenStream {
    let branches = utils::parse_select_branches(input);
    let count = branches.len();

    if count == 0 {
        return "()".parse().unwrap_or_default();
    }

    let generics = (1..=count)
        .map(|i| format!("__T{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    let mut out = String::from("{\n");

    out.push_str(&format!("enum __SelectResult<{generics}> {{\n"));
    for i in 1..=count {
        out.push_str(&format!("    __F{i}(__T{i}),\n"));
    }
    out.push_str("}\n\n");

    for (i, (future, _handler)) in branches.iter().enumerate() {
        let idx = i + 1;
        out.push_str(&format!(
            "let mut __f{idx} = ::std::boxed::Box::pin(::std::future::IntoFuture::into_future({future}));\n"
        ));
    }

    out.push_str("\nlet __res = ::std::future::poll_fn(move |cx| {\n");
    out.push_str("    use ::std::future::Future;\n");
    out.push_str("    use ::std::task::Poll;\n");

    for i in 1..=count {
        out.push_str(&format!(
            "    if let Poll::Ready(val) = __f{i}.as_mut().poll(cx) {{\n\
                 return Poll::Ready(__SelectResult::__F{i}(val));\n\
             }}\n"
        ));
    }

    out.push_str("    Poll::Pending\n");
    out.push_str("}).await;\n\n");

    out.push_str("match __res {\n");
    for (i, (_future, handler)) in branches.iter().enumerate() {
        let idx = i + 1;
        out.push_str(&format!(
            "    __SelectResult::__F{idx}(val) => {{ ({handler})(val) }},\n"
        ));
    }
    out.push_str("}\n");
    out.push_str("}\n");

    out.parse()
        .unwrap_or_else(|err| utils::compile_error(&format!("select! macro error: {err}")))
}

/// Runs `async fn main` on a new event loop.
///
/// `#[stepwise::main(virtual_time)]` uses a virtual clock.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    match utils::loop_builder(attr) {
        Ok(builder) => utils::wrap_body(item, &builder, "#[stepwise::main]"),
        Err(message) => utils::compile_error(&message),
    }
}

/// Runs an `async fn` test on a new event loop.
///
/// `#[stepwise::test(virtual_time)]` uses a virtual clock, so sleeps and
/// timeouts complete instantly while keeping their ordering.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let builder = match utils::loop_builder(attr) {
        Ok(builder) => builder,
        Err(message) => return utils::compile_error(&message),
    };

    let mut result: TokenStream = "#[::core::prelude::v1::test]".parse().unwrap_or_default();
    result.extend(utils::wrap_body(item, &builder, "#[stepwise::test]"));
    result
}

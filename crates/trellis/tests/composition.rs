//! End-to-end composition tests: layouts, blocks, includes, clips and Strip.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use insta::assert_snapshot;
use serde_json::json;
use trellis::{Engine, EngineConfig, RequestContext, Syntax};
use trellis_source::MemorySource;

fn engine_with(config: EngineConfig, files: &[(&str, &str)]) -> Engine {
    let source = MemorySource::new();
    for (name, content) in files {
        source.insert(*name, *content);
    }
    Engine::builder(config)
        .source(Arc::new(source))
        .build()
        .unwrap()
}

fn engine(files: &[(&str, &str)]) -> Engine {
    engine_with(EngineConfig::new("views"), files)
}

fn fetch(engine: &Engine, name: &str) -> String {
    engine.fetch(name, &json!({}), &RequestContext::new())
}

// ============================================================================
// Inheritance
// ============================================================================

#[test]
fn block_override_replaces_layout_content() {
    let e = engine(&[
        ("views/layout.html", r#"<title>{{Block "t"}}D{{/Block}}</title>"#),
        ("views/page.html", r#"{{Extend "layout"}}{{Block "t"}}X{{/Block}}"#),
    ]);
    assert_eq!(fetch(&e, "page"), "<title>X</title>");
}

#[test]
fn super_prepends_descendant_content() {
    let e = engine(&[
        ("views/layout.html", r#"{{Block "t"}}D{{/Block}}"#),
        ("views/page.html", r#"{{Extend "layout"}}{{Block "t"}}X-{{Super}}{{/Block}}"#),
    ]);
    assert_eq!(fetch(&e, "page"), "X-D");
}

#[test]
fn self_closing_super_is_accepted() {
    let e = engine(&[
        ("views/layout.html", r#"{{Block "t"}}D{{/Block}}"#),
        ("views/page.html", r#"{{Extend "layout"}}{{Block "t"}}[{{Super/}}]{{/Block}}"#),
    ]);
    assert_eq!(fetch(&e, "page"), "[D]");
}

#[test]
fn unknown_block_is_pruned() {
    let e = engine(&[
        ("views/layout.html", r#"<h1>{{Block "a"}}A{{/Block}}</h1>"#),
        (
            "views/page.html",
            r#"{{Extend "layout"}}{{Block "a"}}1{{/Block}}{{Block "b"}}orphan{{/Block}}"#,
        ),
    ]);
    let composition = e.compose("page", &RequestContext::new()).unwrap();
    assert_eq!(composition.blocks.keys().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(fetch(&e, "page"), "<h1>1</h1>");
}

#[test]
fn layout_defaults_render_when_not_overridden() {
    let e = engine(&[
        (
            "views/layout.html",
            r#"<h1>{{Block "a"}}A{{/Block}}</h1><p>{{Block "b"}}B {{ n }}{{/Block}}</p>"#,
        ),
        ("views/page.html", r#"{{Extend "layout"}}{{Block "a"}}1{{/Block}}"#),
    ]);
    let out = e.fetch("page", &json!({"n": 7}), &RequestContext::new());
    assert_eq!(out, "<h1>1</h1><p>B 7</p>");
}

#[test]
fn three_level_chain_resolves_leaf_to_root() {
    let e = engine(&[
        (
            "views/base.html",
            r#"<head>{{Block "head"}}base head{{/Block}}</head><body>{{Block "body"}}base body{{/Block}}</body>"#,
        ),
        (
            "views/section.html",
            r#"{{Extend "base"}}{{Block "head"}}section head{{/Block}}{{Block "body"}}<nav/>{{Super}}{{/Block}}"#,
        ),
        (
            "views/page.html",
            r#"{{Extend "section"}}{{Block "body"}}page body{{/Block}}"#,
        ),
    ]);
    // The page overrides the section's body, so the section's Super never applies.
    assert_eq!(
        fetch(&e, "page"),
        "<head>section head</head><body>page body</body>"
    );

    let composition = e.compose("page", &RequestContext::new()).unwrap();
    assert_eq!(
        composition.parents,
        vec!["views/section.html", "views/base.html"]
    );
}

#[test]
fn only_the_first_extend_counts() {
    let e = engine(&[
        ("views/a.html", r#"A:{{Block "x"}}a{{/Block}}"#),
        ("views/b.html", r#"B:{{Block "x"}}b{{/Block}}"#),
        (
            "views/page.html",
            r#"{{Extend "a"}}{{Extend "b"}}{{Block "x"}}X{{/Block}}"#,
        ),
    ]);
    assert_eq!(fetch(&e, "page"), "A:X");
}

#[test]
fn extend_must_lead_the_document() {
    let e = engine(&[
        ("views/layout.html", "LAYOUT"),
        ("views/page.html", r#"<p>{{Extend "layout"}}</p>"#),
    ]);
    // Not a leading directive: it is left for the evaluator, which rejects it.
    assert!(fetch(&e, "page").starts_with("Parse views/page.html err: "));
}

#[test]
fn placeholders_receive_descendant_blocks() {
    let e = engine(&[
        (
            "views/layout.html",
            r#"<head>{{Block "css"/}}</head><main>{{Block "main"}}{{/Block}}</main>"#,
        ),
        (
            "views/page.html",
            r#"{{Extend "layout"}}{{Block "css"}}<link>{{/Block}}{{Block "main"}}m{{/Block}}"#,
        ),
    ]);
    assert_eq!(fetch(&e, "page"), "<head><link></head><main>m</main>");
}

#[test]
fn placeholders_in_the_page_itself_are_removed() {
    let e = engine(&[("views/page.html", r#"a{{Block "x"/}}b"#)]);
    assert_eq!(fetch(&e, "page"), "ab");
}

#[test]
fn repeated_block_names_render_independently() {
    let e = engine(&[
        (
            "views/layout.html",
            r#"<h1>{{Block "t"}}one{{/Block}}</h1><h2>{{Block "t"}}two{{/Block}}</h2>"#,
        ),
        ("views/page.html", r#"{{Extend "layout"}}{{Block "t"}}<{{Super}}>{{/Block}}"#),
    ]);
    assert_eq!(fetch(&e, "page"), "<h1><one></h1><h2><two></h2>");

    let composition = e.compose("page", &RequestContext::new()).unwrap();
    assert_eq!(composition.blocks["t"], "<one>");
    assert_eq!(composition.blocks["t.1"], "<two>");
}

#[test]
fn extend_pass_object_scopes_blocks() {
    let e = engine(&[
        ("views/layout.html", r#"<h1>{{Block "title"}}{{/Block}}</h1>"#),
        (
            "views/page.html",
            r#"{{Extend "layout" post}}{{Block "title"}}{{ value.title }}{{/Block}}"#,
        ),
    ]);
    let out = e.fetch(
        "page",
        &json!({"post": {"title": "Hello"}}),
        &RequestContext::new(),
    );
    assert_eq!(out, "<h1>Hello</h1>");
}

// ============================================================================
// Includes
// ============================================================================

#[test]
fn includes_expand_recursively() {
    let e = engine(&[
        ("views/page.html", r#"<body>{{Include "nav"}}</body>"#),
        ("views/nav.html", r#"<nav>{{Include "item"}}{{Include "item"}}</nav>"#),
        ("views/item.html", "<i>{{ label }}</i>"),
    ]);
    let out = e.fetch("page", &json!({"label": "x"}), &RequestContext::new());
    assert_eq!(out, "<body><nav><i>x</i><i>x</i></nav></body>");

    let composition = e.compose("page", &RequestContext::new()).unwrap();
    assert_eq!(
        composition.fragments.keys().collect::<Vec<_>>(),
        vec!["views/item.html", "views/nav.html"]
    );
    assert!(!composition.document.contains("Include"));
}

#[test]
fn include_pass_object_binds_value() {
    let e = engine(&[
        (
            "views/page.html",
            r#"{% for user in users %}{{Include "row" user}}{% endfor %}"#,
        ),
        ("views/row.html", "[{{ value.name }}]"),
    ]);
    let out = e.fetch(
        "page",
        &json!({"users": [{"name": "ada"}, {"name": "bob"}]}),
        &RequestContext::new(),
    );
    assert_eq!(out, "[ada][bob]");
}

#[test]
fn includes_inside_blocks_and_super() {
    let e = engine(&[
        (
            "views/layout.html",
            r#"{{Block "side"}}{{Include "ad"}}{{/Block}}"#,
        ),
        (
            "views/page.html",
            r#"{{Extend "layout"}}{{Block "side"}}{{Include "promo"}}{{Super}}{{/Block}}"#,
        ),
        ("views/ad.html", "AD"),
        ("views/promo.html", "PROMO"),
    ]);
    assert_eq!(fetch(&e, "page"), "PROMOAD");
}

#[test]
fn self_include_terminates_composition() {
    let e = engine(&[("views/tree.html", r#"node{{Include "tree"}}"#)]);
    let composition = e.compose("tree", &RequestContext::new()).unwrap();
    assert_eq!(composition.fragments.len(), 1);
    assert_eq!(
        composition.fragments["views/tree.html"],
        r#"node{% include "views/tree.html" %}"#
    );
}

#[test]
fn composed_document_snapshot() {
    let e = engine(&[
        (
            "views/layout.html",
            r#"<html>{{Block "head"/}}<body>{{Block "body"}}{{/Block}}{{Include "foot"}}</body></html>"#,
        ),
        (
            "views/page.html",
            r#"{{Extend "layout"}}{{Block "head"}}<meta>{{/Block}}{{Block "body"}}hi{{/Block}}"#,
        ),
        ("views/foot.html", "<footer/>"),
    ]);
    let composition = e.compose("page", &RequestContext::new()).unwrap();
    assert_snapshot!(
        composition.document,
        @r#"<html><meta><body>{% include "block:body" %}{% include "views/foot.html" %}</body></html>"#
    );
}

// ============================================================================
// Function clips
// ============================================================================

#[test]
fn function_clips_are_memoized_per_compile() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let ctx = RequestContext::new().with_clip("year", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        "2026".to_string()
    });
    let e = engine(&[
        (
            "views/layout.html",
            r#"{{Function "year"}}|{{Block "b"}}{{/Block}}|{{Include "foot"}}"#,
        ),
        (
            "views/page.html",
            r#"{{Extend "layout"}}{{Block "b"}}{{Function "year"}}{{/Block}}"#,
        ),
        ("views/foot.html", r#"{{Function "year"}}"#),
    ]);

    assert_eq!(e.fetch("page", &json!({}), &ctx), "2026|2026|2026");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn function_receives_page_name_and_argument() {
    let ctx = RequestContext::new().with_clip("echo", |name, arg| format!("{name}:{arg}"));
    let e = engine(&[("views/admin/index.html", r#"{{Function "echo" main}}"#)]);
    assert_eq!(
        e.fetch("admin/index", &json!({}), &ctx),
        "admin/index:main"
    );
}

#[test]
fn unregistered_function_renders_empty() {
    let e = engine(&[("views/page.html", r#"a{{Function "missing" x}}b"#)]);
    assert_eq!(fetch(&e, "page"), "ab");
}

// ============================================================================
// Strip and preprocessing
// ============================================================================

#[test]
fn strip_compacts_but_preserves_pre() {
    let e = engine(&[(
        "views/page.html",
        "{{Strip}}\n<ul>\n    <li>{{ a }}</li>\n</ul>\n<pre>\n  keep   me\n</pre>\n{{/Strip}}",
    )]);
    let out = e.fetch("page", &json!({"a": 1}), &RequestContext::new());
    assert_eq!(out, "<ul><li>1</li>\n</ul>\n<pre>\n  keep   me\n</pre>");
}

#[test]
fn debug_mode_leaves_strip_content_alone() {
    let mut config = EngineConfig::new("views");
    config.debug = true;
    let e = engine_with(config, &[("views/page.html", "{{Strip}}<p>\n    x</p>{{/Strip}}")]);
    assert_eq!(fetch(&e, "page"), "<p>\n    x</p>");
}

#[test]
fn preprocessors_run_before_scanning() {
    let source = MemorySource::new().with_file("views/page.html", "<p>@@who@@</p>");
    let e = Engine::builder(EngineConfig::new("views"))
        .source(Arc::new(source))
        .preprocessor(|bytes: Vec<u8>| {
            String::from_utf8_lossy(&bytes)
                .replace("@@", "")
                .into_bytes()
        })
        .preprocessor(|bytes: Vec<u8>| {
            String::from_utf8_lossy(&bytes)
                .replace("who", "{{ who }}")
                .into_bytes()
        })
        .build()
        .unwrap();
    let out = e.fetch("page", &json!({"who": "me"}), &RequestContext::new());
    assert_eq!(out, "<p>me</p>");
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn custom_syntax_end_to_end() {
    let mut config = EngineConfig::new("tpl");
    config.extension = ".tpl".into();
    config.syntax = Syntax {
        delim_left: "<%".into(),
        delim_right: "%>".into(),
        extend_tag: "extends".into(),
        block_tag: "section".into(),
        super_tag: "parent".into(),
        include_tag: "partial".into(),
        ..Syntax::default()
    };
    let e = engine_with(
        config,
        &[
            (
                "tpl/base.tpl",
                r#"<main><%section "body"%>base<%/section%></main><%partial "foot"%>"#,
            ),
            (
                "tpl/home.tpl",
                r#"<%extends "base"%><%section "body"%>home+<%parent%><%/section%>"#,
            ),
            ("tpl/foot.tpl", r#"{{Include "ignored"}}"#),
        ],
    );
    let composition = e.compose("home", &RequestContext::new()).unwrap();
    assert_eq!(composition.blocks["body"], "home+base");
    // Default-syntax directives are plain text under the custom syntax.
    assert_eq!(composition.fragments["tpl/foot.tpl"], r#"{{Include "ignored"}}"#);
}

#[test]
fn path_fixer_maps_names() {
    let source = MemorySource::new()
        .with_file("/themes/dark/page.html", r#"{{Extend "layout"}}{{Block "b"}}dark{{/Block}}"#)
        .with_file("/themes/dark/layout.html", r#"[{{Block "b"}}{{/Block}}]"#);
    let e = Engine::builder(EngineConfig::new("unused"))
        .source(Arc::new(source))
        .path_fixer(|_, file| format!("/themes/dark/{file}"))
        .build()
        .unwrap();
    assert_eq!(fetch(&e, "page"), "[dark]");
    assert_eq!(
        e.resolve("page", &RequestContext::new()),
        "/themes/dark/page.html"
    );
}

// ============================================================================
// Fail-soft
// ============================================================================

#[test]
fn missing_page_renders_inline_error() {
    let e = engine(&[]);
    let out = fetch(&e, "nope");
    assert!(out.contains("views/nope.html"), "{out}");
    assert!(out.contains("template not found"), "{out}");
    assert_eq!(e.cache_len(), 0);
}

#[test]
fn missing_layout_renders_inline_error() {
    let e = engine(&[("views/page.html", r#"{{Extend "gone"}}x"#)]);
    let out = fetch(&e, "page");
    assert!(out.contains("views/gone.html"), "{out}");
}

#[test]
fn missing_fragment_replaces_the_including_body() {
    let e = engine(&[("views/page.html", r#"<p>{{Include "gone"}}</p>"#)]);
    let out = fetch(&e, "page");
    assert!(out.starts_with("RenderTemplate views/gone.html read err: "), "{out}");
}

#[test]
fn render_writes_diagnostics_instead_of_failing() {
    let e = engine(&[]);
    let mut buf = Vec::new();
    e.render(&mut buf, "nope", &json!({}), &RequestContext::new())
        .unwrap();
    assert!(String::from_utf8(buf).unwrap().contains("views/nope.html"));
}

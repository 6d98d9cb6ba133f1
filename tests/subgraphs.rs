use shader_graph_compiler::graph::{BinaryOp, BoundaryDef, InputSlot, OutputBinding, UnaryOp};
use shader_graph_compiler::{
    CompileMode, Diagnostic, GeneratedShader, InputRef, Node, NodeErrorKind, NodeKind, Op,
    ParamValue, ResultType, SamplerDef, ShaderCompiler, ShaderGraph, StageInput,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn op_node(id: &str, op: Op, inputs: Vec<InputSlot>) -> Node {
    Node {
        id: id.to_string(),
        kind: NodeKind::Op(op),
        inputs,
        outputs: Vec::new(),
    }
}

fn wired(name: &str, node: &str, output: &str) -> InputSlot {
    InputSlot {
        name: name.to_string(),
        source: Some(InputRef::local(node, output)),
        default: None,
    }
}

fn valued(name: &str, value: ParamValue) -> InputSlot {
    InputSlot {
        name: name.to_string(),
        source: None,
        default: Some(value),
    }
}

fn bind(field: &str, node: &str, output: &str) -> OutputBinding {
    OutputBinding {
        field: field.to_string(),
        node: node.to_string(),
        output: output.to_string(),
    }
}

fn call_node(id: &str, path: &str, inputs: Vec<InputSlot>) -> Node {
    Node {
        id: id.to_string(),
        kind: NodeKind::SubgraphCall {
            path: path.to_string(),
        },
        inputs,
        outputs: Vec::new(),
    }
}

fn boundary_input(id: &str, name: &str, ty: ResultType, default: Option<ParamValue>) -> Node {
    Node {
        id: id.to_string(),
        kind: NodeKind::BoundaryInput(BoundaryDef {
            name: name.to_string(),
            ty,
            default,
        }),
        inputs: Vec::new(),
        outputs: Vec::new(),
    }
}

fn boundary_output(
    id: &str,
    name: &str,
    ty: ResultType,
    default: Option<ParamValue>,
    inputs: Vec<InputSlot>,
) -> Node {
    Node {
        id: id.to_string(),
        kind: NodeKind::BoundaryOutput(BoundaryDef {
            name: name.to_string(),
            ty,
            default,
        }),
        inputs,
        outputs: Vec::new(),
    }
}

fn document(name: &str, nodes: Vec<Node>, outputs: Vec<OutputBinding>) -> ShaderGraph {
    ShaderGraph {
        name: name.to_string(),
        nodes,
        outputs,
        ..ShaderGraph::default()
    }
}

fn subgraph(name: &str, nodes: Vec<Node>) -> ShaderGraph {
    ShaderGraph {
        name: name.to_string(),
        is_subgraph: true,
        nodes,
        ..ShaderGraph::default()
    }
}

fn with_subgraph(mut doc: ShaderGraph, path: &str, sub: ShaderGraph) -> ShaderGraph {
    doc.subgraphs.insert(path.to_string(), sub);
    doc
}

fn compile_final(doc: &ShaderGraph) -> GeneratedShader {
    ShaderCompiler::new(doc)
        .compile()
        .unwrap_or_else(|e| panic!("graph `{}`: final compile failed: {e}", doc.name))
}

fn compile_preview(doc: &ShaderGraph) -> GeneratedShader {
    ShaderCompiler::new(doc)
        .mode(CompileMode::Preview)
        .compile()
        .unwrap_or_else(|e| panic!("graph `{}`: preview compile failed: {e}", doc.name))
}

fn pixel_body(shader: &GeneratedShader) -> &str {
    let src = &shader.pixel_source;
    let start = src
        .find("void main()")
        .unwrap_or_else(|| panic!("no main procedure in pixel source:\n{src}"));
    &src[start..]
}

/// Doubles its `amount` input; used by the call-site tests below.
fn doubler_doc() -> ShaderGraph {
    subgraph(
        "offset",
        vec![
            boundary_input("amount_in", "amount", ResultType::Float, Some(ParamValue::Float(1.0))),
            op_node(
                "double",
                Op::Binary(BinaryOp::Multiply),
                vec![
                    wired("a", "amount_in", "value"),
                    valued("b", ParamValue::Float(2.0)),
                ],
            ),
            boundary_output(
                "out",
                "result",
                ResultType::Float,
                None,
                vec![wired("value", "double", "result")],
            ),
        ],
    )
}

/// Samples a texture handed in through an opaque boundary port.
fn masked_doc() -> ShaderGraph {
    subgraph(
        "inner",
        vec![
            boundary_input("mask_in", "mask", ResultType::Texture2D, None),
            op_node(
                "sample",
                Op::SampleTexture2D {
                    sampler: SamplerDef::default(),
                },
                vec![wired("texture", "mask_in", "value")],
            ),
            boundary_output(
                "out",
                "result",
                ResultType::Color,
                None,
                vec![wired("value", "sample", "result")],
            ),
        ],
    )
}

/// An unconnected call slot falls back to the boundary declaration's
/// default, and constants keep folding across the document boundary.
#[test]
fn boundary_defaults_fill_unconnected_calls() {
    init_logs();
    let doc = with_subgraph(
        document(
            "host",
            vec![call_node("call", "lib/offset", Vec::new())],
            vec![bind("roughness", "call", "result")],
        ),
        "lib/offset",
        doubler_doc(),
    );

    let shader = compile_final(&doc);
    let body = pixel_body(&shader);
    assert!(
        body.contains("float mat_roughness = (1.0 * 2.0);"),
        "default did not fold through the call:\n{body}"
    );
    assert!(!body.contains("l_0"), "constant chain spilled a local:\n{body}");
}

/// Calling the same subgraph twice must evaluate its interior twice; the
/// shared upstream node in the host document is still emitted once.
#[test]
fn call_sites_keep_separate_state() {
    init_logs();
    let wave = subgraph(
        "wave",
        vec![
            boundary_input("pin", "phase", ResultType::Float, None),
            op_node("s", Op::Unary(UnaryOp::Sin), vec![wired("x", "pin", "value")]),
            boundary_output(
                "wout",
                "result",
                ResultType::Float,
                None,
                vec![wired("value", "s", "result")],
            ),
        ],
    );
    let doc = with_subgraph(
        document(
            "twice",
            vec![
                op_node("uv", Op::StageInput(StageInput::TexCoord), Vec::new()),
                op_node(
                    "ux",
                    Op::Swizzle { pattern: "x".to_string() },
                    vec![wired("x", "uv", "result")],
                ),
                op_node(
                    "uy",
                    Op::Swizzle { pattern: "y".to_string() },
                    vec![wired("x", "uv", "result")],
                ),
                call_node("c1", "lib/wave", vec![wired("phase", "ux", "result")]),
                call_node("c2", "lib/wave", vec![wired("phase", "uy", "result")]),
                op_node(
                    "sum",
                    Op::Binary(BinaryOp::Add),
                    vec![wired("a", "c1", "result"), wired("b", "c2", "result")],
                ),
            ],
            vec![bind("alpha", "c1", "result"), bind("roughness", "sum", "result")],
        ),
        "lib/wave",
        wave,
    );

    let shader = compile_final(&doc);
    let body = pixel_body(&shader);
    assert_eq!(
        body.matches("sin(").count(),
        2,
        "one sin per call site:\n{body}"
    );
    assert!(body.contains("float l_2 = sin(l_1);"), "{body}");
    assert!(body.contains("float l_4 = sin(l_3);"), "{body}");
    // The host's uv node is shared, not re-emitted per call.
    assert_eq!(body.matches("vs_texcoord").count(), 1, "{body}");
    // Re-reading c1's output hits the cache instead of a third expansion.
    assert!(body.contains("float mat_alpha = l_2;"), "{body}");
    assert!(body.contains("float l_5 = (l_2 + l_4);"), "{body}");
    assert!(body.contains("float mat_roughness = l_5;"), "{body}");
}

/// An unconnected texture port on a call in the top-level document gets a
/// synthesized placeholder texture; the same port one level deeper is an
/// error, because only the top level can materialize defaults.
#[test]
fn opaque_boundaries_synthesize_only_at_top_level() {
    init_logs();
    let direct = with_subgraph(
        document(
            "direct",
            vec![call_node("c", "fx/inner", Vec::new())],
            vec![bind("albedo", "c", "result")],
        ),
        "fx/inner",
        masked_doc(),
    );
    let shader = compile_final(&direct);
    assert!(shader.diagnostics.is_empty(), "{:?}", shader.diagnostics);
    assert!(
        shader.pixel_source.contains("uniform sampler2D g_tmask;"),
        "missing synthesized texture:\n{}",
        shader.pixel_source
    );
    assert!(shader.pixel_source.contains("// sampler g_sBilinearRepeat"));
    assert!(
        pixel_body(&shader).contains("vec3 mat_albedo = l_0.xyz;"),
        "{}",
        shader.pixel_source
    );

    let outer = with_subgraph(
        subgraph(
            "outer",
            vec![
                call_node("ci", "fx/inner", Vec::new()),
                boundary_output(
                    "oout",
                    "result",
                    ResultType::Color,
                    None,
                    vec![wired("value", "ci", "result")],
                ),
            ],
        ),
        "fx/inner",
        masked_doc(),
    );
    let nested = with_subgraph(
        document(
            "nested",
            vec![call_node("co", "fx/outer", Vec::new())],
            vec![bind("albedo", "co", "result")],
        ),
        "fx/outer",
        outer,
    );
    let shader = compile_preview(&nested);
    assert!(
        shader.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::Node { error: NodeErrorKind::RequiredInSubgraph(input), .. }
                if input == "mask"
        )),
        "expected a required-in-subgraph diagnostic, got {:?}",
        shader.diagnostics
    );
    assert!(
        !shader.pixel_source.contains("g_tmask"),
        "nested call must not synthesize a texture:\n{}",
        shader.pixel_source
    );
    assert!(pixel_body(&shader).contains("vec3 mat_albedo = vec3(1.0, 1.0, 1.0);"));
}

/// A self-referential subgraph terminates via the depth cap and surfaces
/// a diagnostic instead of recursing forever.
#[test]
fn recursive_calls_hit_the_depth_cap() {
    init_logs();
    let doc = with_subgraph(
        document(
            "cycle",
            vec![call_node("c", "r/loop", Vec::new())],
            vec![bind("roughness", "c", "result")],
        ),
        "r/loop",
        subgraph(
            "loop",
            vec![
                call_node("again", "r/loop", Vec::new()),
                boundary_output(
                    "lout",
                    "result",
                    ResultType::Float,
                    None,
                    vec![wired("value", "again", "result")],
                ),
            ],
        ),
    );

    let err = ShaderCompiler::new(&doc)
        .compile()
        .expect_err("recursive document must not compile in final mode");
    assert!(
        err.diagnostics
            .iter()
            .any(|d| d.to_string().contains("subgraph call depth exceeded")),
        "{:?}",
        err.diagnostics
    );
}

#[test]
fn unknown_call_paths_are_reported() {
    init_logs();
    let doc = document(
        "dangling",
        vec![call_node("ghost", "missing/doc", Vec::new())],
        vec![bind("alpha", "ghost", "result")],
    );
    let shader = compile_preview(&doc);
    assert!(
        shader.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::Node { node, .. } if node == "ghost"
        )),
        "{:?}",
        shader.diagnostics
    );
    assert!(
        shader
            .diagnostics
            .iter()
            .any(|d| d.to_string().contains("unknown subgraph document `missing/doc`")),
        "{:?}",
        shader.diagnostics
    );
    assert!(pixel_body(&shader).contains("float mat_alpha = 1.0;"));
}

/// A subgraph document opened on its own (the editor's preview of the
/// subgraph itself) evaluates boundary ports from their declared defaults.
#[test]
fn standalone_subgraph_documents_use_their_defaults() {
    init_logs();
    let mut doc = subgraph(
        "tiles",
        vec![
            boundary_input("amt", "amount", ResultType::Float, Some(ParamValue::Float(0.25))),
            op_node(
                "inv",
                Op::Unary(UnaryOp::OneMinus),
                vec![wired("x", "amt", "value")],
            ),
            boundary_output(
                "outn",
                "tint",
                ResultType::Color,
                Some(ParamValue::Color([0.2, 0.4, 0.6, 1.0])),
                Vec::new(),
            ),
        ],
    );
    doc.outputs = vec![bind("roughness", "inv", "result"), bind("albedo", "outn", "value")];

    let shader = compile_preview(&doc);
    let body = pixel_body(&shader);
    assert!(
        body.contains("float mat_roughness = (1.0 - 0.25);"),
        "boundary default did not feed the interior:\n{body}"
    );
    assert!(
        body.contains("vec3 mat_albedo = vec4(0.2, 0.4, 0.6, 1.0).xyz;"),
        "output default did not surface:\n{body}"
    );
    assert!(!body.contains("l_0"), "constant-only document spilled a local:\n{body}");
}

//! Integration tests for asset transforms

use std::cell::Cell;
use std::rc::Rc;

use flowview::node::builder;
use flowview::{
    AsyncError, AsyncNode, AsyncUpdater, JsonModel, NodeKind, PathSegment, Services, Transform,
    TransformError, TransformRegistry, TransformState, View, ViewBuilder,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn counter() -> Transform {
    Transform::new()
        .named("counter")
        .with_resolve(|mut value, state| {
            let (count, set_count) = state.use_local(|| 0_i64);
            let increment = state.bind_action("increment", move |_| set_count.set(count + 1));
            value["count"] = json!(count);
            value["increment"] = json!(increment);
            Ok(value)
        })
}

fn view_with(content: Value, data: Value, registry: TransformRegistry) -> (Rc<JsonModel>, View) {
    let model = Rc::new(JsonModel::new(data));
    let view = ViewBuilder::new(Services::with_model(model.clone()))
        .with_transforms(registry)
        .build(&content)
        .expect("Should build view");
    (model, view)
}

fn resolve(view: &mut View) -> Rc<Value> {
    view.update()
        .expect("Should resolve")
        .expect("Should produce output")
}

fn counter_content() -> Value {
    json!({
        "id": "page",
        "type": "form",
        "counter": {
            "applicability": "{{show}}",
            "asset": {"id": "clicks", "type": "counter", "label": "{{label}}"}
        },
        "note": {"asset": {"id": "note", "type": "text", "value": "static"}}
    })
}

#[test]
fn test_resolve_transform_augments_output() {
    let registry = TransformRegistry::new().with_type("counter", counter());
    let (_, mut view) = view_with(
        counter_content(),
        json!({"show": true, "label": "Clicks"}),
        registry,
    );

    let output = resolve(&mut view);
    assert_eq!(
        output["counter"]["asset"],
        json!({
            "id": "clicks",
            "type": "counter",
            "label": "Clicks",
            "count": 0,
            "increment": "clicks#increment"
        })
    );
}

#[test]
fn test_dispatched_action_rerenders_only_its_asset() {
    let text_renders = Rc::new(Cell::new(0));
    let seen = Rc::clone(&text_renders);
    let registry = TransformRegistry::new()
        .with_type("counter", counter())
        .with_type(
            "text",
            Transform::new().with_resolve(move |value, _| {
                seen.set(seen.get() + 1);
                Ok(value)
            }),
        );
    let (_, mut view) = view_with(
        counter_content(),
        json!({"show": true, "label": "Clicks"}),
        registry,
    );

    resolve(&mut view);
    assert_eq!(text_renders.get(), 1);

    assert!(view
        .dispatch("clicks#increment", &Value::Null)
        .expect("Should dispatch"));
    assert!(view
        .dispatch("clicks#increment", &Value::Null)
        .expect("Should dispatch"));

    let output = Rc::clone(view.last_update().expect("Should have output"));
    assert_eq!(output["counter"]["asset"]["count"], json!(2));
    assert_eq!(text_renders.get(), 1);
}

#[test]
fn test_local_state_survives_data_changes() {
    let registry = TransformRegistry::new().with_type("counter", counter());
    let (model, mut view) = view_with(
        counter_content(),
        json!({"show": true, "label": "Clicks"}),
        registry,
    );

    resolve(&mut view);
    view.dispatch("clicks#increment", &Value::Null)
        .expect("Should dispatch");

    model.set_path("label", json!("Taps"));
    let output = resolve(&mut view);
    assert_eq!(output["counter"]["asset"]["label"], json!("Taps"));
    assert_eq!(output["counter"]["asset"]["count"], json!(1));
}

#[test]
fn test_state_is_dropped_when_asset_leaves() {
    let registry = TransformRegistry::new().with_type("counter", counter());
    let (model, mut view) = view_with(
        counter_content(),
        json!({"show": true, "label": "Clicks"}),
        registry,
    );

    resolve(&mut view);
    view.dispatch("clicks#increment", &Value::Null)
        .expect("Should dispatch");
    assert!(view.runtime().transforms().has_local("clicks"));

    model.set_path("show", json!(false));
    assert!(resolve(&mut view).get("counter").is_none());
    assert!(!view.runtime().transforms().has_local("clicks"));
    assert!(!view
        .dispatch("clicks#increment", &Value::Null)
        .expect("Should dispatch"));

    model.set_path("show", json!(true));
    assert_eq!(resolve(&mut view)["counter"]["asset"]["count"], json!(0));
}

#[test]
fn test_shared_state_spans_assets() {
    fn tally(mut value: Value, state: &TransformState<'_>) -> Result<Value, TransformError> {
        let (total, set_total) = state.use_shared("votes", || 0_i64);
        let vote = state.bind_action("vote", move |_| set_total.set(total + 1));
        value["total"] = json!(total);
        value["vote"] = json!(vote);
        Ok(value)
    }

    let registry = TransformRegistry::new().with_type("poll", tally);
    let (_, mut view) = view_with(
        json!({
            "id": "page",
            "left": {"asset": {"id": "left", "type": "poll"}},
            "right": {"asset": {"id": "right", "type": "poll"}}
        }),
        json!({}),
        registry,
    );

    resolve(&mut view);
    view.dispatch("left#vote", &Value::Null)
        .expect("Should dispatch");

    let output = Rc::clone(view.last_update().expect("Should have output"));
    assert_eq!(output["left"]["asset"]["total"], json!(1));
    assert_eq!(output["right"]["asset"]["total"], json!(1));
}

#[test]
fn test_before_resolve_sets_skipped_properties() {
    let registry = TransformRegistry::new().with_type(
        "raw",
        Transform::new()
            .with_before_resolve(|node, _| Ok(node.with_properties_to_skip(vec!["source".into()]))),
    );
    let (_, mut view) = view_with(
        json!({
            "id": "page",
            "block": {"asset": {"id": "code", "type": "raw", "source": "{{name}}", "exp": "{{name}}"}}
        }),
        json!({"name": "Ada"}),
        registry,
    );

    let output = resolve(&mut view);
    let asset = &output["block"]["asset"];
    assert_eq!(asset["source"], json!("{{name}}"));
    assert_eq!(asset["exp"], json!("Ada"));
}

#[test]
fn test_failing_transform_keeps_value() {
    let registry = TransformRegistry::new()
        .with_type(
            "text",
            Transform::new()
                .named("broken")
                .with_resolve(|_, _| Err(TransformError::failed("boom"))),
        )
        .with_type("counter", counter());
    let (_, mut view) = view_with(
        counter_content(),
        json!({"show": true, "label": "Clicks"}),
        registry,
    );

    let output = resolve(&mut view);
    assert_eq!(
        output["note"]["asset"],
        json!({"id": "note", "type": "text", "value": "static"})
    );
    assert_eq!(output["counter"]["asset"]["count"], json!(0));
}

#[test]
fn test_before_resolve_wraps_child_with_async_content() {
    let feed = Transform::new().with_before_resolve(|node, state| {
        let id = format!("{}-more", state.id());
        Ok(builder::update_children_by_path(
            node,
            &[PathSegment::from("values")],
            |child| {
                let mut values = match child.value.kind() {
                    NodeKind::MultiNode { values, .. } => values.clone(),
                    _ => vec![Rc::clone(&child.value)],
                };
                values.push(builder::async_node(&id, true, None));
                builder::multi_node(values)
            },
        ))
    });

    let answer = |node: &AsyncNode, updater: AsyncUpdater| -> Result<(), AsyncError> {
        assert_eq!(node.id, "feed-more");
        updater.update(Some(json!([
            {"asset": {"id": "m2", "type": "text", "value": "second"}}
        ])))?;
        Ok(())
    };

    let mut view = ViewBuilder::new(Services::with_model(Rc::new(JsonModel::default())))
        .with_async_handler(answer)
        .with_transforms(TransformRegistry::new().with_type("feed", feed))
        .build(&json!({
            "id": "page",
            "feed": {"asset": {
                "id": "feed",
                "type": "feed",
                "values": [{"asset": {"id": "m1", "type": "text", "value": "first"}}]
            }}
        }))
        .expect("Should build view");

    let first = resolve(&mut view);
    assert_eq!(
        first["feed"]["asset"]["values"],
        json!([{"asset": {"id": "m1", "type": "text", "value": "first"}}])
    );

    let output = view
        .run_until_idle()
        .expect("Should resolve")
        .expect("Should produce output");
    let ids: Vec<Value> = output["feed"]["asset"]["values"]
        .as_array()
        .expect("Should be an array")
        .iter()
        .map(|value| value["asset"]["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("m1"), json!("m2")]);
}

//! Integration tests for graph execution: edges, commands, interrupts,
//! cancellation, recursion limits, and sub-graph dispatch.

use graph_core::{
    Command, GraphBuilder, GraphRuntime, InMemoryThreadStore, NodeOutcome, RunConfig,
    RunDispatcher, RunStatus, StartRun, StateSchema, END, START,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn runtime() -> GraphRuntime {
    GraphRuntime::new(Arc::new(InMemoryThreadStore::new()))
}

fn counter_schema() -> StateSchema {
    StateSchema::new().field("count", json!(0)).field("log", json!(null))
}

#[tokio::test]
async fn linear_graph_runs_to_idle() {
    let rt = runtime();
    let graph = GraphBuilder::new("linear", counter_schema())
        .add_node("bump", |state, _ctx| {
            Box::pin(async move {
                let count = state["count"].as_i64().unwrap_or(0);
                Ok(NodeOutcome::update_json(json!({ "count": count + 1 })))
            })
        })
        .add_node("tag", |_state, _ctx| {
            Box::pin(async move { Ok(NodeOutcome::update_json(json!({ "log": "done" }))) })
        })
        .add_edge(START, "bump")
        .add_edge("bump", "tag")
        .add_edge("tag", END)
        .compile()
        .unwrap();
    rt.register(graph);

    let outcome = rt.invoke(StartRun::new("linear")).await.unwrap();
    assert_eq!(outcome.status(), RunStatus::Idle);
    assert_eq!(outcome.snapshot.values["count"], json!(1));
    assert_eq!(outcome.snapshot.values["log"], json!("done"));
    // initial commit + 2 node commits + idle commit
    assert_eq!(outcome.snapshot.version, 4);
}

#[tokio::test]
async fn conditional_edge_routes_on_state() {
    let rt = runtime();
    let graph = GraphBuilder::new("cond", counter_schema())
        .add_node("probe", |_state, _ctx| {
            Box::pin(async move { Ok(NodeOutcome::empty()) })
        })
        .add_node("high", |_state, _ctx| {
            Box::pin(async move { Ok(NodeOutcome::update_json(json!({ "log": "high" }))) })
        })
        .add_node("low", |_state, _ctx| {
            Box::pin(async move { Ok(NodeOutcome::update_json(json!({ "log": "low" }))) })
        })
        .add_edge(START, "probe")
        .add_conditional_edge(
            "probe",
            |state| {
                if state["count"].as_i64().unwrap_or(0) > 10 {
                    "high".to_string()
                } else {
                    "low".to_string()
                }
            },
            &[("high", "high"), ("low", "low")],
        )
        .add_edge("high", END)
        .add_edge("low", END)
        .compile()
        .unwrap();
    rt.register(graph);

    let mut update = graph_core::StateMap::new();
    update.insert("count".into(), json!(42));
    let outcome = rt
        .invoke(StartRun::new("cond").with_update(update))
        .await
        .unwrap();
    assert_eq!(outcome.snapshot.values["log"], json!("high"));
}

#[tokio::test]
async fn command_goto_overrides_static_edge() {
    let rt = runtime();
    let graph = GraphBuilder::new("cmd", counter_schema())
        .add_node_with_ends("decide", vec!["skip-to"], |_state, _ctx| {
            Box::pin(async move {
                Ok(NodeOutcome::Command(
                    Command::new()
                        .with_update(graph_core::into_update(json!({ "log": "jumped" })))
                        .with_goto("skip-to"),
                ))
            })
        })
        .add_node("unreachable", |_state, _ctx| {
            Box::pin(async move { Ok(NodeOutcome::update_json(json!({ "log": "wrong" }))) })
        })
        .add_node("skip-to", |_state, _ctx| {
            Box::pin(async move { Ok(NodeOutcome::empty()) })
        })
        .add_edge(START, "decide")
        .add_edge("decide", "unreachable")
        .add_edge("unreachable", END)
        .add_edge("skip-to", END)
        .compile()
        .unwrap();
    rt.register(graph);

    let outcome = rt.invoke(StartRun::new("cmd")).await.unwrap();
    assert_eq!(outcome.status(), RunStatus::Idle);
    assert_eq!(outcome.snapshot.values["log"], json!("jumped"));
}

#[tokio::test]
async fn interrupt_suspends_and_resume_replays_node() {
    let rt = runtime();
    let executions = Arc::new(AtomicUsize::new(0));
    let executions_in_node = executions.clone();

    let graph = GraphBuilder::new("hitl", counter_schema())
        .add_node("approve", move |_state, ctx| {
            let executions = executions_in_node.clone();
            Box::pin(async move {
                executions.fetch_add(1, Ordering::SeqCst);
                let approved = match ctx.resume_value() {
                    Some(v) => v.clone(),
                    None => {
                        return Ok(NodeOutcome::Interrupt(json!({ "question": "proceed?" })))
                    }
                };
                Ok(NodeOutcome::update_json(json!({ "log": approved })))
            })
        })
        .add_edge(START, "approve")
        .add_edge("approve", END)
        .compile()
        .unwrap();
    rt.register(graph);

    let thread_id = Uuid::new_v4();
    let outcome = rt
        .invoke(StartRun::new("hitl").on_thread(thread_id))
        .await
        .unwrap();
    assert_eq!(outcome.status(), RunStatus::Interrupted);
    let interrupt = outcome.snapshot.pending_interrupt.clone().unwrap();
    assert_eq!(interrupt.node, "approve");
    assert_eq!(interrupt.payload["question"], json!("proceed?"));

    let resumed = rt.resume(thread_id, json!(true)).await.unwrap();
    assert_eq!(resumed.status(), RunStatus::Idle);
    assert_eq!(resumed.snapshot.values["log"], json!(true));
    // Once for the interrupt, once for the replay.
    assert_eq!(executions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_lands_at_node_boundary() {
    let rt = runtime();
    let graph = GraphBuilder::new("loop", counter_schema())
        .add_node("spin", |state, _ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let count = state["count"].as_i64().unwrap_or(0);
                Ok(NodeOutcome::update_json(json!({ "count": count + 1 })))
            })
        })
        .add_conditional_edge(
            "spin",
            |state| {
                if state["count"].as_i64().unwrap_or(0) >= 1000 {
                    END.to_string()
                } else {
                    "spin".to_string()
                }
            },
            &[("spin", "spin")],
        )
        .add_edge(START, "spin")
        .compile()
        .unwrap();
    rt.register(graph);

    let thread_id = Uuid::new_v4();
    let handle = rt
        .start_run(StartRun::new("loop").on_thread(thread_id).with_config(
            RunConfig::default().with_recursion_limit(5000),
        ))
        .await
        .unwrap();
    assert_eq!(handle.thread_id, thread_id);

    tokio::time::sleep(Duration::from_millis(50)).await;
    rt.cancel(thread_id).await.unwrap();

    // Wait for the runner to observe the flag at the next boundary.
    for _ in 0..100 {
        if rt.thread_status(thread_id).await == RunStatus::Cancelled {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let snapshot = rt.store().get(thread_id).await.unwrap();
    assert_eq!(snapshot.status, RunStatus::Cancelled);
    // The in-flight node completed and its update was merged.
    assert!(snapshot.values["count"].as_i64().unwrap() >= 1);
    assert!(!snapshot.cancel_requested);
}

#[tokio::test]
async fn recursion_limit_is_fatal() {
    let rt = runtime();
    let graph = GraphBuilder::new("forever", counter_schema())
        .add_node("again", |_state, _ctx| {
            Box::pin(async move { Ok(NodeOutcome::empty()) })
        })
        .add_edge(START, "again")
        .add_edge("again", "again")
        .compile()
        .unwrap();
    rt.register(graph);

    let thread_id = Uuid::new_v4();
    let err = rt
        .invoke(
            StartRun::new("forever")
                .on_thread(thread_id)
                .with_config(RunConfig::default().with_recursion_limit(7)),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Recursion limit"));
    assert_eq!(rt.thread_status(thread_id).await, RunStatus::Error);
}

#[tokio::test]
async fn node_error_keeps_last_committed_state() {
    let rt = runtime();
    let graph = GraphBuilder::new("boom", counter_schema())
        .add_node("ok", |_state, _ctx| {
            Box::pin(async move { Ok(NodeOutcome::update_json(json!({ "count": 7 }))) })
        })
        .add_node("fail", |_state, _ctx| {
            Box::pin(async move {
                Err(graph_core::GraphError::Custom("disk on fire".into()))
            })
        })
        .add_edge(START, "ok")
        .add_edge("ok", "fail")
        .add_edge("fail", END)
        .compile()
        .unwrap();
    rt.register(graph);

    let thread_id = Uuid::new_v4();
    let err = rt
        .invoke(StartRun::new("boom").on_thread(thread_id))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("disk on fire"));

    let snapshot = rt.store().get(thread_id).await.unwrap();
    assert_eq!(snapshot.status, RunStatus::Error);
    assert_eq!(snapshot.values["count"], json!(7));
}

#[tokio::test]
async fn subgraph_dispatch_is_fire_and_forget() {
    let rt = runtime();

    let child = GraphBuilder::new("child", counter_schema())
        .add_node("work", |_state, _ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(NodeOutcome::update_json(json!({ "log": "child ran" })))
            })
        })
        .add_edge(START, "work")
        .add_edge("work", END)
        .compile()
        .unwrap();

    let parent = GraphBuilder::new(
        "parent",
        counter_schema().field("child_thread", Value::Null),
    )
    .add_node("launch", |_state, ctx| {
        Box::pin(async move {
            let handle = ctx
                .start_run(StartRun::new("child").at_node("work"))
                .await?;
            Ok(NodeOutcome::update_json(
                json!({ "child_thread": handle.thread_id.to_string() }),
            ))
        })
    })
    .add_edge(START, "launch")
    .add_edge("launch", END)
    .compile()
    .unwrap();

    rt.register(child);
    rt.register(parent);

    let outcome = rt.invoke(StartRun::new("parent")).await.unwrap();
    assert_eq!(outcome.status(), RunStatus::Idle);

    let child_thread: Uuid = outcome.snapshot.values["child_thread"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    // The parent finished without awaiting the child; the child completes
    // on its own schedule.
    for _ in 0..100 {
        if rt.thread_status(child_thread).await == RunStatus::Idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let child_snapshot = rt.store().get(child_thread).await.unwrap();
    assert_eq!(child_snapshot.values["log"], json!("child ran"));
}

#[tokio::test]
async fn concurrent_runs_on_one_thread_serialize() {
    let rt = runtime();
    let graph = GraphBuilder::new("slow", counter_schema())
        .add_node("bump", |state, _ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let count = state["count"].as_i64().unwrap_or(0);
                Ok(NodeOutcome::update_json(json!({ "count": count + 1 })))
            })
        })
        .add_edge(START, "bump")
        .add_edge("bump", END)
        .compile()
        .unwrap();
    rt.register(graph);

    let thread_id = Uuid::new_v4();
    let first = rt.invoke(StartRun::new("slow").on_thread(thread_id));
    let second = rt.invoke(StartRun::new("slow").on_thread(thread_id));
    let (a, b) = tokio::join!(first, second);

    // Both ran, neither lost its increment: the runs serialized.
    let final_count = a
        .unwrap()
        .snapshot
        .values["count"]
        .as_i64()
        .max(b.unwrap().snapshot.values["count"].as_i64());
    assert_eq!(final_count, Some(2));
}

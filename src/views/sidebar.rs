use crate::session::{AppContext, ChatSession};
use crate::types::ThreadSummary;
use crate::views::shared::message_count_label;
use dioxus::prelude::*;

/// Thread list with the "new conversation" action. Controls are disabled
/// while a reply is streaming.
#[component]
pub fn Sidebar(session: Signal<ChatSession>, busy: bool) -> Element {
    let ctx = use_context::<AppContext>();
    let mut session = session;
    let snapshot = session();

    let registry = ctx.registry.clone();
    let on_new_chat = move |_| session.with_mut(|s| s.new_chat(&registry));

    rsx! {
        aside { class: "sidebar",
            button {
                class: "btn btn-primary new-chat",
                r#type: "button",
                disabled: busy,
                onclick: on_new_chat,
                "New conversation"
            }
            div { class: "thread-list",
                if snapshot.threads.is_empty() {
                    div { class: "thread-empty", "No conversations yet" }
                }
                for summary in snapshot.threads.iter() {
                    ThreadRow {
                        key: "{summary.thread_id}",
                        summary: summary.clone(),
                        active: snapshot.is_active(&summary.thread_id),
                        busy,
                        session,
                    }
                }
            }
            div { class: "sidebar-footer",
                span {
                    class: "thread-id",
                    title: "{snapshot.active}",
                    "Thread {snapshot.active.short()}"
                }
            }
        }
    }
}

#[component]
fn ThreadRow(
    summary: ThreadSummary,
    active: bool,
    busy: bool,
    session: Signal<ChatSession>,
) -> Element {
    let ctx = use_context::<AppContext>();
    let mut session = session;

    let select_registry = ctx.registry.clone();
    let select_id = summary.thread_id.clone();
    let on_select = move |_| {
        session.with_mut(|s| {
            s.select(&select_registry, &select_id);
        });
    };

    let delete_registry = ctx.registry;
    let delete_id = summary.thread_id.clone();
    let on_delete = move |_| {
        session.with_mut(|s| {
            s.delete_thread(&delete_registry, &delete_id);
        });
    };

    let class = if active { "thread-row active" } else { "thread-row" };
    rsx! {
        div { class: class,
            button {
                class: "thread-select",
                r#type: "button",
                title: "{message_count_label(summary.message_count)}",
                disabled: busy,
                onclick: on_select,
                "{summary.topic}"
            }
            button {
                class: "thread-delete",
                r#type: "button",
                title: "Delete conversation",
                disabled: busy,
                onclick: on_delete,
                "✕"
            }
        }
    }
}

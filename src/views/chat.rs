use crate::pipeline::{Pipeline, TurnError};
use crate::session::{AppContext, ChatSession, Notice};
use crate::types::{ChatMessage, Role, ThreadId};
use crate::views::shared::markdown_to_html;
use dioxus::events::Key;
use dioxus::prelude::*;

/// Drive one turn, mirroring the reply into `streaming` as it arrives.
async fn run_turn(
    pipeline: &Pipeline,
    thread_id: &ThreadId,
    text: &str,
    mut streaming: Signal<Option<String>>,
) -> Result<ChatMessage, TurnError> {
    let mut turn = pipeline.begin_turn(thread_id, text).await?;
    while let Some(fragment) = turn.next_fragment().await {
        if fragment.is_err() {
            break;
        }
        streaming.set(Some(turn.partial().to_string()));
    }
    turn.commit().await
}

fn role_class(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn notice_class(notice: &Notice) -> &'static str {
    if notice.is_error() {
        "notice error"
    } else {
        "notice"
    }
}

#[component]
pub fn ChatView(session: Signal<ChatSession>, streaming: Signal<Option<String>>) -> Element {
    let ctx = use_context::<AppContext>();
    let mut input = use_signal(String::new);
    let mut session = session;
    let mut streaming = streaming;

    let send_message = use_callback(move |text: String| {
        let text = text.trim_end().to_string();
        if text.trim().is_empty() || streaming().is_some() {
            return;
        }

        let thread_id = session.with_mut(|s| {
            s.push_user(text.clone());
            s.active.clone()
        });
        input.set(String::new());
        streaming.set(Some(String::new()));

        let pipeline = ctx.pipeline.clone();
        let registry = ctx.registry.clone();
        spawn(async move {
            let outcome = run_turn(&pipeline, &thread_id, &text, streaming).await;
            session.with_mut(|s| {
                if s.is_active(&thread_id) {
                    match &outcome {
                        Ok(reply) => s.push_assistant(reply.content.clone()),
                        Err(err) => s.fail_turn(err),
                    }
                }
                s.refresh_threads(&registry);
            });
            streaming.set(None);
        });
    });

    let snapshot = session();
    let partial = streaming();
    let sending = partial.is_some();

    rsx! {
        main { class: "main-container",
            div { class: "chat-wrap",
                div { id: "chat-list", class: "chat-list",
                    if snapshot.transcript.is_empty() && !sending {
                        div { class: "chat-empty", "What can I help you with?" }
                    }
                    for (i, msg) in snapshot.transcript.iter().enumerate() {
                        MessageRow { key: "{i}", message: msg.clone() }
                    }
                    if let Some(content) = partial {
                        StreamingRow { content }
                    }
                }
            }

            if let Some(notice) = snapshot.notice.clone() {
                div { class: notice_class(&notice),
                    span { "{notice.message()}" }
                    button {
                        class: "action-btn",
                        r#type: "button",
                        onclick: move |_| session.with_mut(|s| s.notice = None),
                        "Dismiss"
                    }
                }
            }

            form { class: "composer no-divider",
                div { class: "composer-inner",
                    div { class: "hstack",
                        textarea {
                            rows: "1",
                            placeholder: "Type a message",
                            value: "{input}",
                            oninput: move |ev| input.set(ev.value()),
                            onkeydown: move |ev| {
                                if ev.key() == Key::Enter && !ev.modifiers().shift() {
                                    ev.prevent_default();
                                    send_message.call(input());
                                }
                            },
                            disabled: sending,
                            autofocus: true,
                        }
                        button {
                            class: "btn btn-primary",
                            r#type: "button",
                            disabled: sending || input().trim().is_empty(),
                            onclick: move |_| send_message.call(input()),
                            "Send"
                        }
                    }
                }
            }
        }
    }
}

#[component]
fn MessageRow(message: ChatMessage) -> Element {
    let role = role_class(message.role);
    rsx! {
        div { class: "message-row {role}",
            div { class: "bubble {role}",
                if message.role == Role::User {
                    "{message.content}"
                } else {
                    div { class: "md", dangerous_inner_html: markdown_to_html(&message.content) }
                }
            }
        }
    }
}

#[component]
fn StreamingRow(content: String) -> Element {
    rsx! {
        div { class: "message-row assistant",
            div { class: "bubble assistant",
                if content.is_empty() {
                    div { class: "shimmer-line",
                        span { class: "shimmer-text", "Thinking…" }
                    }
                } else {
                    div { class: "md", dangerous_inner_html: markdown_to_html(&content) }
                }
            }
        }
    }
}

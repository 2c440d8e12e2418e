use crate::session::AppContext;
use crate::views::{ChatView, Sidebar};
use dioxus::prelude::*;

const CHAT_CSS: Asset = asset!("/assets/chat.css");

/// Root component. Expects an [`AppContext`] provided at launch.
#[component]
pub fn App() -> Element {
    let ctx = use_context::<AppContext>();
    let session = use_signal(move || ctx.session());
    let streaming = use_signal(|| Option::<String>::None);

    rsx! {
        document::Link { rel: "stylesheet", href: CHAT_CSS }
        div { class: "app-shell",
            Sidebar { session, busy: streaming().is_some() }
            ChatView { session, streaming }
        }
    }
}


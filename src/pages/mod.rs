use crate::api::{PageFetcher, PageQuery, SearchEndpoint};
use crate::app::services;
use crate::components::hooks::use_scroll_metrics::use_scroll_metrics;
use crate::loader::{ListState, LoadState, RouteLoader, RouteSnapshot};
use crate::models::{CommandRequest, Gallery, TagToken, Video};
use crate::notify::Message;
use crate::options::{Accumulation, OptionSource, OptionValue, SelectOption};
use crate::pagination::Pagination;
use crate::reactive::{
    bind_two_way, load_more_on_scroll, mirror_options, route_source, signal_source, watch_loader,
};
use crate::state::AppContext;
use leptos::prelude::*;
use leptos::task::spawn_local;
use serde::de::DeserializeOwned;
use uuid::Uuid;

const STORAGE_SYNC_DAG: &str = "sync-minio-storages";

/// Query for a list endpoint from the current route: `page`, `size` and `s` are
/// lifted out, everything else is passed through.
fn route_query(route: &RouteSnapshot, default_size: u32) -> PageQuery {
    let size = route
        .param("size")
        .and_then(|s| s.parse().ok())
        .filter(|s| *s > 0)
        .unwrap_or(default_size);
    let mut query = PageQuery::new(size);
    query.page = route.page().unwrap_or(1).max(1);
    query.s = route.param("s").unwrap_or_default().to_string();
    query.extra = route
        .query
        .iter()
        .filter(|(k, _)| !matches!(k.as_str(), "page" | "size" | "s"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    query
}

struct RouteList<R: Send + Sync + 'static> {
    load: RwSignal<LoadState<Vec<R>>>,
    pager: RwSignal<Option<Pagination>>,
    /// Bump to reload the current route.
    reload: RwSignal<u32>,
}

/// Load `endpoint` for the current route, again on every route change.
fn use_route_list<R>(endpoint: SearchEndpoint<R>) -> RouteList<R>
where
    R: DeserializeOwned + Clone + Send + Sync + 'static,
{
    let app_state = expect_context::<AppContext>();
    let size = app_state.0.config.page_size;
    let load = RwSignal::new(LoadState::Unloaded);
    let pager = RwSignal::new(None);
    let reload = RwSignal::new(0u32);

    let route = route_source();
    let loader = RouteLoader::new(ListState::<R>::new());
    loader.set_route_source(route.clone());
    loader.set_watch_sources(vec![signal_source(reload)]);
    loader.set_load_function(move |list, _| {
        let Some(snapshot) = route() else {
            return;
        };
        let ticket = list.begin();
        load.set(list.load_state());

        let (list, endpoint) = (list.clone(), endpoint.clone());
        spawn_local(async move {
            let query = route_query(&snapshot, size);
            let result = match endpoint.fetch(&query).await {
                Ok(items) => {
                    let pager = Pagination::open_ended(
                        &snapshot.path,
                        query.page,
                        query.size,
                        items.len(),
                        &snapshot.query,
                    );
                    Ok((items, pager))
                }
                Err(e) => {
                    let message = e.user_message();
                    let _ = services().messages.push_error::<()>(e);
                    Err(message)
                }
            };
            if list.finish(ticket, result) {
                let _ = load.try_set(list.load_state());
                let _ = pager.try_set(list.pagination());
            }
        });
    });
    watch_loader(loader);

    RouteList {
        load,
        pager,
        reload,
    }
}

#[component]
fn PagerView(pager: RwSignal<Option<Pagination>>) -> impl IntoView {
    let link_class = "rounded-md border border-border px-2 py-1 text-xs hover:bg-surface-hover";

    view! {
        {move || {
            pager.get().map(|p| {
                let current = p.current;
                view! {
                    <nav class="flex items-center gap-1 pt-4">
                        <a class=link_class href=p.first.clone()>"«"</a>
                        {p.previous.clone().map(|href| view! { <a class=link_class href=href>"‹"</a> })}
                        {p
                            .pages
                            .iter()
                            .map(|page| {
                                let active = page.n == current;
                                view! {
                                    <a
                                        class=link_class
                                        class:font-semibold=active
                                        href=page.link.clone()
                                    >
                                        {page.n}
                                    </a>
                                }
                            })
                            .collect_view()}
                        {p.next.clone().map(|href| view! { <a class=link_class href=href>"›"</a> })}
                        <a class=link_class href=p.last.clone()>"»"</a>
                    </nav>
                }
            })
        }}
    }
}

#[component]
fn LoadStatus<R: Clone + Send + Sync + 'static>(load: RwSignal<LoadState<Vec<R>>>) -> impl IntoView {
    view! {
        {move || match load.get() {
            LoadState::Loading => {
                Some(view! { <div class="text-xs text-muted-foreground">"Loading..."</div> }.into_any())
            }
            LoadState::Failed(message) => {
                Some(view! { <div class="text-xs text-destructive">{message}</div> }.into_any())
            }
            LoadState::Loaded(items) if items.is_empty() => {
                Some(view! { <div class="text-sm text-muted-foreground">"Nothing here."</div> }.into_any())
            }
            _ => None,
        }}
    }
}

#[component]
pub fn GalleryPage() -> impl IntoView {
    let api = expect_context::<AppContext>().0.api_client.get_untracked();
    let RouteList {
        load,
        pager,
        reload,
    } = use_route_list(SearchEndpoint::galleries(api));

    let galleries = move || load.with(|l| l.loaded().cloned().unwrap_or_default());

    view! {
        <div class="space-y-3 px-4 py-6">
            <div class="flex items-center justify-between">
                <h1 class="text-xl font-semibold">"Galleries"</h1>
                <button
                    class="text-xs text-muted-foreground underline"
                    on:click=move |_| reload.update(|n| *n += 1)
                >
                    "Reload"
                </button>
            </div>
            <LoadStatus load=load />
            <div class="space-y-1">
                <For each=galleries key=|g: &Gallery| g.id.clone() let:gallery>
                    <div class="rounded-md border border-border bg-background px-3 py-2">
                        <div class="truncate text-sm font-medium">
                            {gallery.attributes.name.clone().unwrap_or_else(|| gallery.id.clone())}
                        </div>
                        <div class="truncate text-xs text-muted-foreground">
                            {gallery.attributes.category.clone().unwrap_or_default()}
                        </div>
                    </div>
                </For>
            </div>
            <PagerView pager=pager />
        </div>
    }
}

#[component]
pub fn VideoPage() -> impl IntoView {
    let api = expect_context::<AppContext>().0.api_client.get_untracked();
    let RouteList {
        load,
        pager,
        reload,
    } = use_route_list(SearchEndpoint::videos(api));

    let videos = move || load.with(|l| l.loaded().cloned().unwrap_or_default());

    view! {
        <div class="space-y-3 px-4 py-6">
            <div class="flex items-center justify-between">
                <h1 class="text-xl font-semibold">"Videos"</h1>
                <button
                    class="text-xs text-muted-foreground underline"
                    on:click=move |_| reload.update(|n| *n += 1)
                >
                    "Reload"
                </button>
            </div>
            <LoadStatus load=load />
            <div class="space-y-1">
                <For each=videos key=|v: &Video| v.id.clone() let:video>
                    <div class="rounded-md border border-border bg-background px-3 py-2">
                        <div class="truncate text-sm font-medium">
                            {video.name.clone().unwrap_or_else(|| video.id.clone())}
                        </div>
                    </div>
                </For>
            </div>
            <PagerView pager=pager />
        </div>
    }
}

fn tag_option(tag: &TagToken) -> SelectOption<TagToken> {
    SelectOption::new(tag.name.as_str())
        .with_value(tag.id)
        .with_raw(tag.clone())
}

/// Tag autocomplete: filter text, scroll-to-load, chips, and a two-way bound selection.
#[component]
pub fn TagPicker(selected: RwSignal<Option<OptionValue>>) -> impl IntoView {
    let svc = services();
    let source = OptionSource::new(
        SearchEndpoint::tag_tokens(svc.api.clone()),
        tag_option,
        &svc.config,
    )
    .with_accumulation(Accumulation::DedupByKey);

    let state = mirror_options(&source);
    let (on_scroll, metrics, can_scroll_up) = use_scroll_metrics();
    load_more_on_scroll(source.clone(), metrics, svc.messages.clone());

    let inner = RwSignal::new(source.selected_value());
    bind_two_way(selected, inner);
    source.subscribe(move |st| {
        if inner
            .try_with_untracked(|v| *v != st.selected_value)
            .unwrap_or(false)
        {
            let _ = inner.try_set(st.selected_value.clone());
        }
    });

    let stored = StoredValue::new_local(source.clone());
    Effect::new(move |_| {
        let value = inner.get();
        stored.with_value(|s| {
            if s.selected_value() == value {
                return;
            }
            let title = s
                .options()
                .into_iter()
                .chain(s.chips())
                .find(|o| o.value == value)
                .map(|o| o.title)
                .or_else(|| value.clone());
            s.set_selection(title, value);
        });
    });

    // First page on mount.
    {
        let source = stored.get_value();
        spawn_local(async move {
            if let Err(e) = source.reset_and_fetch_first_page().await {
                let _ = services().messages.push_error::<()>(e);
            }
        });
    }

    let on_input = move |ev: web_sys::Event| {
        let text = event_target_value(&ev);
        let source = stored.get_value();
        spawn_local(async move {
            if let Err(e) = source.set_filter(text).await {
                let _ = services().messages.push_error::<()>(e);
            }
        });
    };

    let options = move || state.with(|st| st.options.clone());
    let chips = move || state.with(|st| st.chips.clone());

    view! {
        <div class="space-y-2">
            <input
                class="h-8 w-full rounded-md border border-border bg-background px-2 text-sm"
                placeholder="Search tags"
                on:input=on_input
            />

            <div class="flex flex-wrap gap-1">
                <For each=chips key={|c: &SelectOption<TagToken>| (c.title.clone(), c.value.clone())} let:chip>
                    <button
                        class="rounded-full bg-muted px-2 py-0.5 text-xs"
                        on:click=move |_| {
                            stored.with_value(|s| s.remove_chip(&chip));
                        }
                    >
                        {chip.title.to_string()}" ×"
                    </button>
                </For>
            </div>

            <div
                class="max-h-64 overflow-y-auto rounded-md border border-border"
                class:shadow-inner=move || can_scroll_up.get()
                on:scroll=on_scroll
            >
                <For each=options key={|o: &SelectOption<TagToken>| (o.title.clone(), o.value.clone())} let:option>
                    {
                        let pick = option.clone();
                        let chip = option.clone();
                        let is_selected = {
                            let value = option.value.clone();
                            move || state.with(|st| st.selected_value == value)
                        };
                        view! {
                            <div
                                class="flex items-center justify-between px-3 py-1.5 text-sm hover:bg-surface-hover"
                                class:font-semibold=is_selected
                            >
                                <span class="cursor-pointer truncate" on:click=move |_| stored.with_value(|s| s.select(&pick))>
                                    {option.title.to_string()}
                                </span>
                                <button
                                    class="text-xs text-muted-foreground"
                                    on:click=move |_| {
                                        stored.with_value(|s| s.add_chip(chip.clone()));
                                    }
                                >
                                    "+"
                                </button>
                            </div>
                        }
                    }
                </For>
                <Show when=move || state.with(|st| st.phase.is_fetching())>
                    <div class="px-3 py-1.5 text-xs text-muted-foreground">"Loading..."</div>
                </Show>
                <Show when=move || state.with(|st| st.end_of_data && !st.options.is_empty())>
                    <div class="px-3 py-1.5 text-xs text-muted-foreground">"No more tags."</div>
                </Show>
            </div>

            <button
                class="text-xs text-muted-foreground underline"
                on:click=move |_| stored.with_value(|s| s.clear())
            >
                "Clear selection"
            </button>
        </div>
    }
}

#[component]
pub fn TagPage() -> impl IntoView {
    let selected = RwSignal::new(None::<OptionValue>);

    view! {
        <div class="space-y-3 px-4 py-6">
            <h1 class="text-xl font-semibold">"Tags"</h1>
            <TagPicker selected=selected />
            <p class="text-xs text-muted-foreground">
                {move || match selected.get() {
                    Some(v) => format!("Selected tag id: {v}"),
                    None => "No tag selected.".to_string(),
                }}
            </p>
        </div>
    }
}

// Keyed on id only, so a hover lock does not rebuild the toast.
fn toast_key(m: &Message) -> Uuid {
    m.id
}

fn toast_locked(queue: &[Message], id: Uuid) -> bool {
    queue.iter().any(|m| m.id == id && m.lock)
}

/// Toasts in the corner. Hovering keeps one on screen; clicking dismisses it.
#[component]
pub fn ToastHost() -> impl IntoView {
    let messages = expect_context::<AppContext>().0.messages;

    view! {
        <div class="fixed bottom-4 right-4 z-50 flex w-80 flex-col gap-2">
            <For each=move || messages.get() key=toast_key let:message>
                {
                    let id = message.id;
                    let locked = move || messages.with(|q| toast_locked(q, id));
                    view! {
                        <div
                            class="cursor-pointer rounded-md border border-border bg-background px-3 py-2 text-sm shadow"
                            class:ring-1=locked
                            on:click=move |_| {
                                services().messages.dismiss(id);
                            }
                            on:mouseenter=move |_| {
                                services().messages.set_lock(id, true);
                            }
                            on:mouseleave=move |_| {
                                services().messages.set_lock(id, false);
                            }
                        >
                            {match message.link.clone() {
                                Some(href) => view! { <a class="underline" href=href>{message.detail.clone()}</a> }.into_any(),
                                None => view! { <span>{message.detail.clone()}</span> }.into_any(),
                            }}
                        </div>
                    }
                }
            </For>
        </div>
    }
}

/// Navigation plus the running-task indicator.
#[component]
pub fn NavBar() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let running = app_state.0.running_tasks;
    let busy = RwSignal::new(false);

    let on_sync = move |_| {
        busy.set(true);
        spawn_local(async move {
            let tasks = services().tasks;
            // Failures already surface as toasts.
            let _ = tasks
                .trigger_and_track(STORAGE_SYNC_DAG, &CommandRequest::default(), None, None)
                .await;
            let _ = busy.try_set(false);
        });
    };

    view! {
        <nav class="flex items-center gap-4 border-b border-border px-4 py-2 text-sm">
            <a href="/gallery">"Galleries"</a>
            <a href="/video">"Videos"</a>
            <a href="/tag">"Tags"</a>
            <a href="/messages">"Messages"</a>
            <div class="ml-auto flex items-center gap-2">
                <span class="text-xs text-muted-foreground">
                    {move || match running.with(Vec::len) {
                        0 => "No running tasks".to_string(),
                        n => format!("{n} running"),
                    }}
                </span>
                <button
                    class="rounded-md border border-border px-2 py-1 text-xs"
                    disabled=move || busy.get()
                    on:click=on_sync
                >
                    "Sync storages"
                </button>
            </div>
        </nav>
    }
}

#[component]
pub fn MessageHistoryPage() -> impl IntoView {
    let history = expect_context::<AppContext>().0.message_history;

    view! {
        <div class="space-y-3 px-4 py-6">
            <div class="flex items-center justify-between">
                <h1 class="text-xl font-semibold">"Messages"</h1>
                <button
                    class="text-xs text-muted-foreground underline"
                    on:click=move |_| services().messages.clear_history()
                >
                    "Clear history"
                </button>
            </div>
            <Show
                when=move || history.with(|h| !h.is_empty())
                fallback=|| view! { <div class="text-sm text-muted-foreground">"No messages yet."</div> }
            >
                <div class="space-y-1">
                    <For each={move || history.get().into_iter().rev().collect::<Vec<_>>()} key=|m: &Message| m.id let:message>
                        <div class="rounded-md border border-border px-3 py-2">
                            <div class="text-sm">{message.detail.clone()}</div>
                            <div class="text-xs text-muted-foreground">
                                {message.last_updated.format("%Y-%m-%d %H:%M:%S").to_string()}
                            </div>
                        </div>
                    </For>
                </div>
            </Show>
        </div>
    }
}

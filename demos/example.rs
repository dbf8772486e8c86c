use std::time::Duration;

use futures::StreamExt;
use tokio::{spawn, time::sleep};
use urlstate::{ParamStore, QueryStateConfig, query_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = ParamStore::from_uri("/search?q=rust")?;
    let (query, set_query) = query_state(&store, QueryStateConfig::<String>::parse("q"));
    let (page, set_page) = query_state(
        &store,
        QueryStateConfig::new("page", urlstate::ParseCodec::new(1u32).omit_default()),
    );

    // Prints the query every time it changes
    let mut queries = query.subscribe();
    spawn(async move {
        while let Some(q) = queries.next().await {
            println!("query: {q}");
        }
    });
    sleep(Duration::from_millis(100)).await;

    set_page.update(|p| p + 1);
    println!("?{}", store.params()); // ?q=rust&page=2
    sleep(Duration::from_millis(100)).await;

    set_query.set("serde".into());
    set_page.set(1); // the page parameter is removed
    println!("?{}", store.params()); // ?q=serde
    sleep(Duration::from_millis(100)).await;

    store.go(-2); // back to ?q=rust&page=2
    println!("page {}", page.get());
    sleep(Duration::from_millis(100)).await;
    Ok(())
}

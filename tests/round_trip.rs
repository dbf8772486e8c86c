use test_strategy::proptest;
use urlstate::{ParamStore, QueryStateConfig, query_state};

#[proptest]
fn value_survives_url(values: Vec<i64>) {
    let store = ParamStore::default();
    let (_, set_value) = query_state(&store, QueryStateConfig::<i64>::parse("v"));
    for value in values {
        set_value.set(value);
        let (reloaded, _) = query_state(&store, QueryStateConfig::<i64>::parse("v"));
        assert_eq!(reloaded.get(), value);
    }
}

#[proptest]
fn text_survives_url(text: String) {
    let store = ParamStore::default();
    let (_, set_text) = query_state(&store, QueryStateConfig::<String>::parse("t"));
    set_text.set(text.clone());

    let query = store.params().to_string();
    let reloaded = ParamStore::from_uri(&format!("/?{query}")).unwrap();
    let (value, _) = query_state(&reloaded, QueryStateConfig::<String>::parse("t"));
    assert_eq!(value.get(), text);
}

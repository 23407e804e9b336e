use docmap::engine::odm::{
    boolean, date, number, string, JoinTree, OdmError, Operation, Registry, RegistryBuilder, Relation,
    Schema,
};
use docmap::engine::store::{DocumentStore, Filter, MemoryStore};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

fn shop_builder(mem: &Arc<MemoryStore>) -> Result<RegistryBuilder, Box<dyn std::error::Error>> {
    let store: Arc<dyn DocumentStore> = mem.clone();
    let mut builder = Registry::builder(store);

    builder
        .define(
            "users",
            Schema::new()
                .field("username", string().required().min(3))
                .field("description", string().max(20)),
        )?
        .define(
            "orders",
            Schema::new()
                .field("userID", string().required())
                .field("status", string().default("pending").one_of(["pending", "paid"]))
                .field("created", date().default_now()),
        )?
        .define(
            "cart_items",
            Schema::new()
                .field("orderID", string().required())
                .field("qty", number().min(1))
                .field("gift", boolean().default(false)),
        )?;

    builder
        .has_many("orders", "cart_items", "items", "orderID")
        .belongs_to("orders", "users", "user", "userID")
        .has_many("users", "orders", "orders", "userID");

    Ok(builder)
}

async fn shop(mem: &Arc<MemoryStore>) -> Result<Registry, Box<dyn std::error::Error>> {
    Ok(shop_builder(mem)?.build_ready().await?)
}

#[tokio::test]
async fn test_order_with_cart_items() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let users = registry.model("users")?;
    let orders = registry.model("orders")?;
    let items = registry.model("cart_items")?;

    let alice = users.create(json!({"username": "alice"})).await?;
    let order = orders.create(json!({"userID": alice.id()})).await?;
    let other = orders.create(json!({"userID": alice.id()})).await?;

    items.create(json!({"orderID": order.id(), "qty": 2})).await?;
    items.create(json!({"orderID": order.id(), "qty": "3"})).await?;
    items.create(json!({"orderID": other.id(), "qty": 1})).await?;

    let order_id = order.id().ok_or("order has no id")?;
    let loaded = orders
        .get(order_id)
        .get_join(json!({"items": true, "user": true}))
        .await?
        .ok_or("order missing")?;

    let joined = loaded.many("items");
    assert_eq!(joined.len(), 2);
    assert!(joined.iter().all(|i| i.get("orderID") == Some(&json!(order_id))));
    assert_eq!(joined[1].get("qty"), Some(&json!(3.0)));
    assert_eq!(loaded.one("user").and_then(|u| u.get("username")), Some(&json!("alice")));
    assert_eq!(loaded.get("status"), Some(&json!("pending")));

    // Joined data is never written back
    let mut loaded = loaded;
    orders.save(&mut loaded).await?;
    let raw = mem.get("orders", order_id).await?.ok_or("order missing")?;
    assert!(raw.get("items").is_none());
    assert!(raw.get("user").is_none());
    Ok(())
}

#[tokio::test]
async fn test_empty_joins() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let orders = registry.model("orders")?;

    let order = orders.create(json!({"userID": "nobody"})).await?;
    let id = order.id().ok_or("no id")?;

    let loaded = orders.get(id).get_join(["items", "user"]).await?.ok_or("order missing")?;
    assert!(loaded.many("items").is_empty());
    assert!(loaded.one("user").is_none());
    assert!(loaded.related("items").is_some());
    Ok(())
}

#[tokio::test]
async fn test_nested_join() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let users = registry.model("users")?;
    let orders = registry.model("orders")?;
    let items = registry.model("cart_items")?;

    let bob = users.create(json!({"username": "bob"})).await?;
    let order = orders.create(json!({"userID": bob.id()})).await?;
    items.create(json!({"orderID": order.id(), "qty": 1})).await?;

    let found = users
        .filter(json!({"username": "bob"}))
        .get_join(JoinTree::new().nest("orders", JoinTree::from("items")))
        .await?;

    assert_eq!(found.len(), 1);
    let user_orders = found[0].many("orders");
    assert_eq!(user_orders.len(), 1);
    assert_eq!(user_orders[0].many("items").len(), 1);

    let out = found[0].to_json();
    assert_eq!(out["orders"][0]["items"][0]["qty"], json!(1));
    Ok(())
}

#[tokio::test]
async fn test_unknown_join_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let orders = registry.model("orders")?;

    orders.create(json!({"userID": "u1"})).await?;
    let found = orders.all().get_join(["missing", "items"]).await?;

    assert_eq!(found.len(), 1);
    assert!(found[0].related("missing").is_none());
    assert!(found[0].related("items").is_some());
    Ok(())
}

#[tokio::test]
async fn test_self_referential_relation() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = mem.clone();
    let mut builder = Registry::builder(store);
    builder.define(
        "categories",
        Schema::new().field("name", string().required()).field("parentID", string()),
    )?;
    builder
        .belongs_to("categories", "categories", "parent", "parentID")
        .has_many("categories", "categories", "children", "parentID");
    let registry = builder.build_ready().await?;
    let categories = registry.model("categories")?;

    let root = categories.create(json!({"name": "root"})).await?;
    categories.create(json!({"name": "a", "parentID": root.id()})).await?;
    let b = categories.create(json!({"name": "b", "parentID": root.id()})).await?;

    let root = categories
        .get(root.id().ok_or("no id")?)
        .get_join("children")
        .await?
        .ok_or("root missing")?;
    assert_eq!(root.many("children").len(), 2);

    let b = categories
        .get(b.id().ok_or("no id")?)
        .get_join(json!({"parent": {"children": true}}))
        .await?
        .ok_or("b missing")?;
    let parent = b.one("parent").ok_or("no parent")?;
    assert_eq!(parent.get("name"), Some(&json!("root")));
    assert_eq!(parent.many("children").len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_await_and_run_are_equivalent() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let items = registry.model("cart_items")?;

    for qty in [1, 2, 3, 4] {
        items.create(json!({"orderID": "o1", "qty": qty})).await?;
    }

    let before = mem.stats().queries();
    let query = items.filter(Filter::gte("qty", 2)).order_by("-qty").limit(2);

    let via_run = query.run().await?;
    assert_eq!(mem.stats().queries(), before + 1);

    let via_await = query.clone().await?;
    assert_eq!(mem.stats().queries(), before + 2);

    let qtys: Vec<Value> = via_await.iter().filter_map(|i| i.get("qty").cloned()).collect();
    assert_eq!(qtys, vec![json!(4), json!(3)]);
    assert_eq!(
        via_run.iter().map(|i| i.to_json()).collect::<Vec<_>>(),
        via_await.iter().map(|i| i.to_json()).collect::<Vec<_>>()
    );

    // Building a query performs no I/O
    let _unused = items.filter(json!({"orderID": "o1"})).order_by("qty");
    assert_eq!(mem.stats().reads(), before + 2);
    Ok(())
}

#[tokio::test]
async fn test_save_hooks_run_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let calls = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut builder = shop_builder(&mem)?;

    let log = calls.clone();
    builder.pre_sync("users", Operation::Save, move |inst| {
        log.lock().unwrap().push("pre-1".to_string());
        let name = inst.get("username").and_then(Value::as_str).unwrap_or_default().to_lowercase();
        inst.set("username", name);
        Ok(())
    });
    let log = calls.clone();
    builder.pre("users", Operation::Save, move |mut inst| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(format!("pre-2 new={}", inst.is_new()));
            inst.set("touched", true);
            Ok::<_, OdmError>(inst)
        }
    });
    let log = calls.clone();
    builder.post_sync("users", Operation::Save, move |inst| {
        log.lock().unwrap().push(format!("post id={}", inst.id().is_some()));
        Ok(())
    });

    let registry = builder.build_ready().await?;
    let users = registry.model("users")?;
    let carol = users.create(json!({"username": "CAROL"})).await?;

    assert_eq!(carol.get("username"), Some(&json!("carol")));
    assert_eq!(carol.get("touched"), Some(&json!(true)));
    assert_eq!(
        *calls.lock().unwrap(),
        vec!["pre-1".to_string(), "pre-2 new=true".to_string(), "post id=true".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_pre_hook_failure_aborts_save() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let mut builder = shop_builder(&mem)?;
    builder.pre_sync("users", Operation::Save, |inst| {
        if inst.get("username") == Some(&json!("root")) {
            return Err(OdmError::hook("reserved username"));
        }
        Ok(())
    });
    let registry = builder.build_ready().await?;
    let users = registry.model("users")?;

    let mut inst = users.new_instance(json!({"username": "root"}))?;
    let err = users.save(&mut inst).await.unwrap_err();

    assert!(matches!(err, OdmError::Hook(_)));
    assert!(inst.is_new());
    assert_eq!(mem.stats().inserts(), 0);
    Ok(())
}

#[tokio::test]
async fn test_delete_hooks_and_missing_identifier() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let deleted = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut builder = shop_builder(&mem)?;
    let log = deleted.clone();
    builder.post_sync("users", Operation::Delete, move |inst| {
        log.lock().unwrap().push(inst.id().unwrap_or_default().to_string());
        Ok(())
    });
    let registry = builder.build_ready().await?;
    let users = registry.model("users")?;

    let mut unsaved = users.new_instance(json!({"username": "dave"}))?;
    let err = users.delete(&mut unsaved).await.unwrap_err();
    assert!(matches!(err, OdmError::MissingIdentifier { operation: "delete", .. }));
    assert_eq!(mem.stats().deletes(), 0);

    let mut dave = users.create(json!({"username": "dave"})).await?;
    let id = dave.id().ok_or("no id")?.to_string();
    users.delete(&mut dave).await?;

    assert!(dave.is_new());
    assert_eq!(*deleted.lock().unwrap(), vec![id.clone()]);
    assert!(users.get(&id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_sequential_saves_get_distinct_ids() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = mem.clone();
    let mut builder = Registry::builder(store);
    builder.define("notes", Schema::new().field("body", string()))?;
    let registry = builder.build_ready().await?;
    let notes = registry.model("notes")?;

    let mut first = notes.new_instance(json!({}))?;
    let mut second = notes.new_instance(json!({}))?;
    notes.save(&mut first).await?;
    notes.save(&mut second).await?;

    assert!(first.id().is_some());
    assert_ne!(first.id(), second.id());
    assert_eq!(notes.count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_round_trip_and_update() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let users = registry.model("users")?;

    let mut erin = users
        .create(json!({"username": "erin", "description": "hello", "extra": [1, 2]}))
        .await?;
    let id = erin.id().ok_or("no id")?.to_string();

    let loaded = users.get(&id).await?.ok_or("erin missing")?;
    assert_eq!(loaded.to_json(), erin.to_json());

    erin.set("description", "updated");
    users.save(&mut erin).await?;
    assert_eq!(erin.id(), Some(id.as_str()));
    assert_eq!(mem.stats().updates(), 1);
    assert_eq!(users.count().await?, 1);

    let loaded = users.get(&id).run().await?.ok_or("erin missing")?;
    assert_eq!(loaded.get("description"), Some(&json!("updated")));
    Ok(())
}

#[tokio::test]
async fn test_strict_save_rejects_invalid() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let users = registry.model("users")?;

    // Construction is lenient
    let mut bad = users.new_instance(json!({"username": "ab", "description": "x".repeat(30)}))?;
    assert_eq!(bad.get("username"), Some(&json!("ab")));
    assert!(users.validate(&bad).is_err());

    let err = users.save(&mut bad).await.unwrap_err();
    match err {
        OdmError::Validation(v) => assert_eq!(v.field, "username"),
        other => return Err(format!("unexpected error: {}", other).into()),
    }
    assert!(bad.is_new());

    let err = users.create(json!({"description": "no name"})).await.unwrap_err();
    assert!(matches!(err, OdmError::Validation(_)));
    assert_eq!(mem.stats().inserts(), 0);
    Ok(())
}

#[tokio::test]
async fn test_generated_default_filled_at_save() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let orders = registry.model("orders")?;

    let inst = orders.new_instance(json!({"userID": "u1"}))?;
    assert!(inst.get("created").is_none());
    assert_eq!(inst.get("status"), Some(&json!("pending")));

    let saved = orders.create(json!({"userID": "u1"})).await?;
    let created = saved.get("created").and_then(Value::as_str).ok_or("created not set")?;
    assert!(chrono::DateTime::parse_from_rfc3339(created).is_ok());

    let given = orders
        .create(json!({"userID": "u1", "created": "2024-01-02T03:04:05Z"}))
        .await?;
    assert_eq!(given.get("created"), Some(&json!("2024-01-02T03:04:05.000Z")));
    Ok(())
}

#[tokio::test]
async fn test_lenient_read_of_invalid_stored_doc() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let users = registry.model("users")?;

    let mut raw = serde_json::Map::new();
    raw.insert("username".to_string(), json!(42));
    let id = mem.insert("users", raw).await?;

    let loaded = users.get(&id).await?.ok_or("doc missing")?;
    assert_eq!(loaded.get("username"), Some(&json!(42)));
    assert!(users.validate(&loaded).is_err());
    Ok(())
}

#[tokio::test]
async fn test_bulk_count_update_delete() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let orders = registry.model("orders")?;

    for user in ["u1", "u1", "u2"] {
        orders.create(json!({"userID": user})).await?;
    }

    assert_eq!(orders.count().await?, 3);
    assert_eq!(orders.filter(json!({"userID": "u1"})).count().await?, 2);
    assert_eq!(orders.all().skip(1).limit(5).count().run().await?, 2);

    let updated = orders.filter(json!({"userID": "u1"})).update(json!({"status": "paid"})).await?;
    assert_eq!(updated, 2);
    assert_eq!(orders.filter(json!({"status": "paid"})).count().await?, 2);

    let err = orders.all().update(json!({"status": "lost"})).await.unwrap_err();
    assert!(matches!(err, OdmError::Validation(_)));

    let removed = orders.filter(json!({"status": "paid"})).delete().await?;
    assert_eq!(removed, 2);
    assert_eq!(orders.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn test_build_rejects_unknown_models() -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let mut builder = Registry::builder(store);
    builder.define("orders", Schema::new())?;
    builder.has_many("orders", "ghosts", "items", "orderID");

    assert!(matches!(builder.build(), Err(OdmError::UnknownModel(t)) if t == "ghosts"));
    Ok(())
}

#[tokio::test]
async fn test_has_many_indexes_foreign_key() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;

    assert_eq!(registry.tables(), vec!["cart_items", "orders", "users"]);
    assert!(mem.list_indexes("cart_items").await?.contains(&"orderID".to_string()));
    assert!(mem.list_indexes("orders").await?.contains(&"userID".to_string()));

    // A second pass finds everything in place
    registry.ensure_tables().await?;
    Ok(())
}

#[tokio::test]
async fn test_form_numbers_match_typed_numbers() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = mem.clone();
    let mut builder = Registry::builder(store);
    builder
        .define("invoices", Schema::new().field("no", number().required()))?
        .define(
            "lines",
            Schema::new().field("invoiceNo", number().required()).field("qty", number()),
        )?;
    builder.relate("invoices", Relation::has_many("lines", "lines", "invoiceNo").with_local_key("no"));
    let registry = builder.build_ready().await?;
    let invoices = registry.model("invoices")?;
    let lines = registry.model("lines")?;

    invoices.create(json!({"no": 7})).await?;
    lines.create(json!({"invoiceNo": "7", "qty": "3"})).await?;
    lines.create(json!({"invoiceNo": 7, "qty": 3})).await?;

    assert_eq!(lines.filter(json!({"qty": 3})).count().await?, 2);
    assert_eq!(lines.filter(json!({"qty": 3.0})).await?.len(), 2);

    let found = invoices.filter(json!({"no": 7.0})).get_join("lines").await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].many("lines").len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_bulk_update_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let items = registry.model("cart_items")?;

    items.create(json!({"orderID": "o1", "qty": 2})).await?;
    let mut legacy = serde_json::Map::new();
    legacy.insert("orderID".to_string(), json!("o1"));
    legacy.insert("qty".to_string(), json!(0));
    mem.insert("cart_items", legacy).await?;

    let err = items.all().update(json!({"gift": true})).await.unwrap_err();
    assert!(matches!(err, OdmError::Validation(_)));
    assert_eq!(mem.stats().updates(), 0);
    assert_eq!(items.filter(json!({"gift": true})).count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_models_usable_right_after_build() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = mem.clone();
    let mut builder = Registry::builder(store);
    builder.define("notes", Schema::new().field("body", string()))?;
    let registry = builder.build()?;

    let notes = registry.model("notes")?;
    let note = notes.create(json!({"body": "hi"})).await?;
    assert!(note.id().is_some());
    assert_eq!(notes.count().await?, 1);
    assert!(mem.table_exists("notes").await?);
    Ok(())
}

#[tokio::test]
async fn test_tables_created_on_first_use_when_not_eager() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let store: Arc<dyn DocumentStore> = mem.clone();
    let mut builder = Registry::builder(store);
    builder.define("notes", Schema::new())?;
    builder.ensure_tables_on_build(false);
    let registry = builder.build()?;

    assert!(!mem.table_exists("notes").await?);
    assert!(registry.model("notes")?.all().await?.is_empty());
    assert!(mem.table_exists("notes").await?);
    Ok(())
}

#[tokio::test]
async fn test_get_update_and_delete() -> Result<(), Box<dyn std::error::Error>> {
    let mem = Arc::new(MemoryStore::new());
    let registry = shop(&mem).await?;
    let users = registry.model("users")?;

    let frank = users.create(json!({"username": "frank"})).await?;
    let grace = users.create(json!({"username": "grace"})).await?;
    let frank_id = frank.id().ok_or("no id")?;
    let grace_id = grace.id().ok_or("no id")?;

    assert_eq!(users.get(frank_id).update(json!({"description": "ops"})).await?, 1);
    let frank = users.get(frank_id).await?.ok_or("frank missing")?;
    assert_eq!(frank.get("description"), Some(&json!("ops")));
    let grace = users.get(grace_id).await?.ok_or("grace missing")?;
    assert!(grace.get("description").is_none());

    assert_eq!(users.get("unknown").update(json!({"description": "x"})).await?, 0);

    assert_eq!(users.get(frank_id).delete().run().await?, 1);
    assert!(users.get(frank_id).await?.is_none());
    assert_eq!(users.count().await?, 1);
    Ok(())
}

use std::sync::Arc;

use serde_json::json;
use sqlx_sqlite_orm::{
   CachingFactory, Catalog, Entity, EntityKind, Error, FileLocator, Locale, MemoryLocator,
   Property, Reference, Repository, Settings, SqliteDatabaseConfig, TRANSIENT, Where,
};
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::datetime;

sqlx_sqlite_orm::property_enum! {
   pub enum Color { Red, Green, Blue }
}

struct People {
   person: Arc<EntityKind>,
   name: Property<String>,
   age: Property<i32>,
}

fn people() -> People {
   let mut person = EntityKind::builder("test.Person");
   let name = person.property::<String>("name");
   let age = person.property::<i32>("age");
   People {
      person: person.build().unwrap(),
      name,
      age,
   }
}

async fn memory_repository(catalog: Catalog) -> Repository {
   Repository::open(MemoryLocator::new(), Settings::new(catalog))
      .await
      .expect("Failed to open in-memory repository")
}

async fn person(model: &People, name: &str, age: i32) -> Entity {
   let entity = Entity::new(&model.person);
   entity.set(&model.name, name.to_string()).await.unwrap();
   entity.set(&model.age, age).await.unwrap();
   entity
}

#[tokio::test]
async fn test_insert_assigns_id_once() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;

   let ada = person(&model, "Ada", 36).await;
   assert_eq!(ada.id(), TRANSIENT);
   assert!(ada.is_transient());

   repository.insert(&ada).await.unwrap();
   assert!(ada.id() > 0);

   // A persisted entity cannot be inserted again
   let err = repository.insert(&ada).await.unwrap_err();
   assert_eq!(err.error_code(), "ALREADY_PERSISTED");
}

#[tokio::test]
async fn test_scalar_round_trip() {
   let mut sample = EntityKind::builder("test.Sample");
   let flag = sample.property::<bool>("flag");
   let byte = sample.property::<i8>("byte");
   let short = sample.property::<i16>("short");
   let int = sample.property::<i32>("int");
   let long = sample.property::<i64>("long");
   let float = sample.property::<f32>("float");
   let double = sample.property::<f64>("double");
   let letter = sample.property::<char>("letter");
   let text = sample.property::<String>("text");
   let bytes = sample.property::<Vec<u8>>("bytes");
   let when = sample.property::<OffsetDateTime>("when");
   let color = sample.property::<Color>("color");
   let locale = sample.property::<Locale>("locale");
   let extra = sample.property::<serde_json::Value>("extra");
   let missing = sample.property::<Option<String>>("missing");
   let sample = sample.build().unwrap();

   let repository = memory_repository(Catalog::new().with(&sample)).await;

   let stamp = datetime!(2024-03-01 12:30:45.123 UTC);
   let original = Entity::new(&sample);
   original.set(&flag, true).await.unwrap();
   original.set(&byte, -7).await.unwrap();
   original.set(&short, 30_000).await.unwrap();
   original.set(&int, -2_000_000).await.unwrap();
   original.set(&long, i64::MAX).await.unwrap();
   original.set(&float, 1.5).await.unwrap();
   original.set(&double, -2.25).await.unwrap();
   original.set(&letter, 'λ').await.unwrap();
   original.set(&text, "héllo".to_string()).await.unwrap();
   original.set(&bytes, vec![0, 1, 254, 255]).await.unwrap();
   original.set(&when, stamp).await.unwrap();
   original.set(&color, Color::Blue).await.unwrap();
   original
      .set(&locale, Locale::new("fr", "CA"))
      .await
      .unwrap();
   original
      .set(&extra, json!({"tags": ["a", "b"], "n": 1}))
      .await
      .unwrap();
   repository.insert(&original).await.unwrap();

   let loaded = repository.lookup(&original.reference().unwrap()).await.unwrap();
   assert!(!loaded.is(&original));
   assert_eq!(loaded.id(), original.id());
   assert!(loaded.get(&flag).await.unwrap());
   assert_eq!(loaded.get(&byte).await.unwrap(), -7);
   assert_eq!(loaded.get(&short).await.unwrap(), 30_000);
   assert_eq!(loaded.get(&int).await.unwrap(), -2_000_000);
   assert_eq!(loaded.get(&long).await.unwrap(), i64::MAX);
   assert_eq!(loaded.get(&float).await.unwrap(), 1.5);
   assert_eq!(loaded.get(&double).await.unwrap(), -2.25);
   assert_eq!(loaded.get(&letter).await.unwrap(), 'λ');
   assert_eq!(loaded.get(&text).await.unwrap(), "héllo");
   assert_eq!(loaded.get(&bytes).await.unwrap(), vec![0, 1, 254, 255]);
   assert_eq!(loaded.get(&when).await.unwrap(), stamp);
   assert_eq!(loaded.get(&color).await.unwrap(), Color::Blue);
   assert_eq!(loaded.get(&locale).await.unwrap(), Locale::new("fr", "CA"));
   assert_eq!(
      loaded.get(&extra).await.unwrap(),
      json!({"tags": ["a", "b"], "n": 1})
   );
   assert_eq!(loaded.get(&missing).await.unwrap(), None);
}

#[tokio::test]
async fn test_update_and_refresh() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;

   let ada = person(&model, "Ada", 36).await;
   repository.insert(&ada).await.unwrap();
   let stale = repository.lookup(&ada.reference().unwrap()).await.unwrap();

   ada.set(&model.age, 37).await.unwrap();
   repository.update(&ada).await.unwrap();

   assert_eq!(stale.get(&model.age).await.unwrap(), 36);
   repository.refresh(&stale).await.unwrap();
   assert_eq!(stale.get(&model.age).await.unwrap(), 37);
}

#[tokio::test]
async fn test_transient_entities_cannot_be_updated_or_deleted() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;

   let ghost = person(&model, "Ghost", 0).await;
   assert_eq!(
      repository.update(&ghost).await.unwrap_err().error_code(),
      "TRANSIENT"
   );
   assert_eq!(
      repository.delete(&ghost).await.unwrap_err().error_code(),
      "TRANSIENT"
   );
}

#[tokio::test]
async fn test_merge_inserts_then_updates() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;

   let ada = person(&model, "Ada", 36).await;
   repository.merge(&ada).await.unwrap();
   let id = ada.id();
   assert!(id > 0);

   ada.set(&model.name, "Ada Lovelace".to_string()).await.unwrap();
   repository.merge(&ada).await.unwrap();
   assert_eq!(ada.id(), id);

   let loaded = repository.lookup(&ada.reference().unwrap()).await.unwrap();
   assert_eq!(loaded.get(&model.name).await.unwrap(), "Ada Lovelace");
}

#[tokio::test]
async fn test_delete_makes_entity_transient() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;

   let ada = person(&model, "Ada", 36).await;
   repository.insert(&ada).await.unwrap();
   let reference = ada.reference().unwrap();

   repository.delete(&ada).await.unwrap();
   assert!(ada.is_transient());

   let err = repository.lookup(&reference).await.unwrap_err();
   assert!(err.is_not_found());
   assert_eq!(err.error_code(), "NOT_FOUND");

   // Deleted entities can be inserted again as new rows
   repository.insert(&ada).await.unwrap();
   assert_ne!(ada.id(), reference.id());
}

#[tokio::test]
async fn test_reference_string_round_trip() {
   let model = people();
   let catalog = Catalog::new().with(&model.person);
   let repository = memory_repository(catalog.clone()).await;

   let ada = person(&model, "Ada", 36).await;
   repository.insert(&ada).await.unwrap();

   let text = ada.reference().unwrap().to_string();
   assert_eq!(text, format!("entity://test.Person/{}", ada.id()));

   let parsed = Reference::parse(&text, &catalog).unwrap();
   let loaded = repository.lookup(&parsed).await.unwrap();
   assert_eq!(loaded.get(&model.name).await.unwrap(), "Ada");
}

#[tokio::test]
async fn test_schema_adds_missing_columns() {
   let temp = TempDir::new().unwrap();
   let path = temp.path().join("evolve.db");

   let model = people();
   let repository = Repository::open(
      FileLocator::new(&path),
      Settings::new(Catalog::new().with(&model.person)),
   )
   .await
   .unwrap();
   let ada = person(&model, "Ada", 36).await;
   repository.insert(&ada).await.unwrap();
   repository.close().await.unwrap();

   // Same kind, one more property
   let mut person = EntityKind::builder("test.Person");
   let name = person.property::<String>("name");
   let _age = person.property::<i32>("age");
   let score = person.property_with_default::<i32>("score", 7);
   let person = person.build().unwrap();

   let repository = Repository::open(
      FileLocator::new(&path),
      Settings::new(Catalog::new().with(&person)),
   )
   .await
   .unwrap();
   let loaded = repository
      .lookup(&Reference::new(Arc::clone(&person), ada.id()).unwrap())
      .await
      .unwrap();
   assert_eq!(loaded.get(&name).await.unwrap(), "Ada");
   assert_eq!(loaded.get(&score).await.unwrap(), 7);
   repository.close().await.unwrap();
}

#[tokio::test]
async fn test_column_type_mismatch_is_reported() {
   let temp = TempDir::new().unwrap();
   let path = temp.path().join("mismatch.db");

   let model = people();
   let repository = Repository::open(
      FileLocator::new(&path),
      Settings::new(Catalog::new().with(&model.person)),
   )
   .await
   .unwrap();
   repository
      .insert(&person(&model, "Ada", 36).await)
      .await
      .unwrap();
   repository.close().await.unwrap();

   // `age` is now declared as text
   let mut person = EntityKind::builder("test.Person");
   let _name = person.property::<String>("name");
   let _age = person.property::<String>("age");
   let person = person.build().unwrap();

   let repository = Repository::open(
      FileLocator::new(&path),
      Settings::new(Catalog::new().with(&person)),
   )
   .await
   .unwrap();
   let err = repository.insert(&Entity::new(&person)).await.unwrap_err();
   assert_eq!(err.error_code(), "COLUMN_TYPE_MISMATCH");
   repository.close().await.unwrap();
}

#[tokio::test]
async fn test_subtypes_share_the_root_table() {
   let mut animal = EntityKind::builder("zoo.Animal");
   let name = animal.property::<String>("name");
   let animal = animal.build().unwrap();
   let mut dog = EntityKind::extends("zoo.Dog", &animal);
   let good = dog.property::<bool>("good");
   let dog = dog.build().unwrap();

   let repository = memory_repository(Catalog::new().with(&animal).with(&dog)).await;

   let cat = Entity::new(&animal);
   cat.set(&name, "Tom".to_string()).await.unwrap();
   repository.insert(&cat).await.unwrap();

   let rex = Entity::new(&dog);
   rex.set(&name, "Rex".to_string()).await.unwrap();
   rex.set(&good, true).await.unwrap();
   repository.insert(&rex).await.unwrap();

   // Looking up through the base kind yields the stored subtype
   let loaded = repository
      .lookup(&Reference::new(Arc::clone(&animal), rex.id()).unwrap())
      .await
      .unwrap();
   assert_eq!(loaded.kind().name(), "zoo.Dog");
   assert!(loaded.get(&good).await.unwrap());

   // A dog reference does not resolve to a plain animal row
   let err = repository
      .lookup(&Reference::new(Arc::clone(&dog), cat.id()).unwrap())
      .await
      .unwrap_err();
   assert!(err.is_not_found());

   assert_eq!(repository.query(&Entity::new(&animal)).count().await.unwrap(), 2);
   let dogs = repository
      .query(&Entity::new(&dog))
      .list()
      .await
      .unwrap()
      .into_vec()
      .await
      .unwrap();
   assert_eq!(dogs.len(), 1);
   assert_eq!(dogs[0].get(&name).await.unwrap(), "Rex");
}

#[tokio::test]
async fn test_caching_factory_returns_live_instances() {
   let model = people();
   let settings =
      Settings::new(Catalog::new().with(&model.person)).with_factory(CachingFactory::new());
   let repository = Repository::open(MemoryLocator::new(), settings).await.unwrap();

   let ada = person(&model, "Ada", 36).await;
   repository.insert(&ada).await.unwrap();
   let reference = ada.reference().unwrap();

   let first = repository.lookup(&reference).await.unwrap();
   let second = repository.lookup(&reference).await.unwrap();
   assert!(first.is(&second));
}

#[tokio::test]
async fn test_backup_and_restore() {
   let temp = TempDir::new().unwrap();
   let path = temp.path().join("live.db");
   let backup = temp.path().join("backup.db");
   let model = people();
   let settings = || Settings::new(Catalog::new().with(&model.person));

   let repository = Repository::open(FileLocator::new(&path), settings())
      .await
      .unwrap();
   repository
      .insert(&person(&model, "Ada", 36).await)
      .await
      .unwrap();
   assert!(repository.backup(&backup).await.unwrap() > 0);
   repository
      .insert(&person(&model, "Grace", 45).await)
      .await
      .unwrap();

   // Restoring an open database is refused
   let err = FileLocator::new(&path).restore(&backup).await.unwrap_err();
   assert_eq!(err.error_code(), "CONNECTION_ERROR");
   repository.close().await.unwrap();

   FileLocator::new(&path).restore(&backup).await.unwrap();
   let repository = Repository::open(FileLocator::new(&path), settings())
      .await
      .unwrap();
   let everyone = Entity::new(&model.person);
   assert_eq!(repository.query(&everyone).count().await.unwrap(), 1);
   let ada = repository.query(&everyone).single().await.unwrap().unwrap();
   assert_eq!(ada.get(&model.name).await.unwrap(), "Ada");
   repository.close().await.unwrap();
}

#[tokio::test]
async fn test_derived_repository_shares_database() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;
   let derived = repository.derive(|settings| settings.with_factory(CachingFactory::new()));
   assert!(derived.is_derived());

   let ada = person(&model, "Ada", 36).await;
   derived.insert(&ada).await.unwrap();
   assert!(repository.lookup(&ada.reference().unwrap()).await.is_ok());

   let err = derived.close().await.unwrap_err();
   assert_eq!(err.error_code(), "DERIVED_REPOSITORY");
   repository.close().await.unwrap();
}

#[tokio::test]
async fn test_explicit_transactions() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;
   let everyone = Entity::new(&model.person);

   let mut tx = repository.begin().await.unwrap();
   tx.insert(&person(&model, "Ada", 36).await).await.unwrap();
   tx.insert(&person(&model, "Grace", 45).await).await.unwrap();
   tx.rollback().await.unwrap();
   assert_eq!(repository.query(&everyone).count().await.unwrap(), 0);

   let mut tx = repository.begin().await.unwrap();
   let ada = person(&model, "Ada", 36).await;
   tx.insert(&ada).await.unwrap();
   ada.set(&model.age, 37).await.unwrap();
   tx.update(&ada).await.unwrap();
   let seen = tx.lookup(&ada.reference().unwrap()).await.unwrap();
   assert_eq!(seen.get(&model.age).await.unwrap(), 37);
   tx.commit().await.unwrap();
   assert_eq!(repository.query(&everyone).count().await.unwrap(), 1);

   // An abandoned transaction is rolled back
   let tx = {
      let mut tx = repository.begin().await.unwrap();
      tx.insert(&person(&model, "Grace", 45).await).await.unwrap();
      tx
   };
   drop(tx);
   assert_eq!(repository.query(&everyone).count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_transactional_commits_or_rolls_back() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;
   let everyone = Entity::new(&model.person);

   let ada = person(&model, "Ada", 36).await;
   let grace = person(&model, "Grace", 45).await;
   let inserted = repository
      .transactional(|tx| {
         let (ada, grace) = (ada.clone(), grace.clone());
         Box::pin(async move {
            tx.insert(&ada).await?;
            tx.insert(&grace).await?;
            Ok(2)
         })
      })
      .await
      .unwrap();
   assert_eq!(inserted, 2);
   assert_eq!(repository.query(&everyone).count().await.unwrap(), 2);

   let linus = person(&model, "Linus", 28).await;
   let result = repository
      .transactional(|tx| {
         let (linus, ada) = (linus.clone(), ada.clone());
         Box::pin(async move {
            tx.insert(&linus).await?;
            // fails: already persisted
            tx.insert(&ada).await
         })
      })
      .await;
   assert_eq!(result.unwrap_err().error_code(), "ALREADY_PERSISTED");
   assert_eq!(repository.query(&everyone).count().await.unwrap(), 2);
   assert_eq!(
      repository
         .query(&everyone)
         .filter(Where::equal(&everyone, &model.name, "Linus".to_string()))
         .count()
         .await
         .unwrap(),
      0
   );
}

#[tokio::test]
async fn test_fresh_repository_is_version_zero() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;
   assert_eq!(repository.version().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_insert_leaves_repository_usable() {
   let mut owner = EntityKind::builder("test.Owner");
   let name = owner.property::<String>("name");
   let friend = owner.relation("friend", "test.Owner");
   let owner = owner.build().unwrap();
   let repository = memory_repository(Catalog::new().with(&owner)).await;

   // The table is created inside the failing write and rolled back with it
   let ada = Entity::new(&owner);
   ada.set(&friend, Some(Entity::new(&owner))).await.unwrap();
   let err = repository.insert(&ada).await.unwrap_err();
   assert_eq!(err.error_code(), "TRANSIENT_REFERENCE");

   let grace = Entity::new(&owner);
   grace.set(&name, "Grace".to_string()).await.unwrap();
   repository.insert(&grace).await.unwrap();

   let everyone = Entity::new(&owner);
   let found = repository
      .query(&everyone)
      .filter(Where::equal(&everyone, &name, "Grace".to_string()))
      .single()
      .await
      .unwrap()
      .unwrap();
   assert_eq!(found.id(), grace.id());
}

#[tokio::test]
async fn test_rolled_back_transaction_does_not_keep_new_tables() {
   let model = people();
   let repository = memory_repository(Catalog::new().with(&model.person)).await;
   let everyone = Entity::new(&model.person);

   let ada = person(&model, "Ada", 36).await;
   let result: sqlx_sqlite_orm::Result<()> = repository
      .transactional(|tx| {
         let ada = ada.clone();
         Box::pin(async move {
            tx.insert(&ada).await?;
            Err(Error::Unsupported("abandon".into()))
         })
      })
      .await;
   assert_eq!(result.unwrap_err().error_code(), "UNSUPPORTED");
   assert_eq!(repository.query(&everyone).count().await.unwrap(), 0);

   let mut tx = repository.begin().await.unwrap();
   tx.insert(&person(&model, "Grace", 45).await).await.unwrap();
   tx.rollback().await.unwrap();

   repository.insert(&person(&model, "Linus", 28).await).await.unwrap();
   assert_eq!(repository.query(&everyone).count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_relations_load_through_open_transaction() {
   let mut node = EntityKind::builder("test.Node");
   let label = node.property::<String>("label");
   let parent = node.relation("parent", "test.Node");
   let children = node.list("children", "test.Node");
   let node = node.build().unwrap();

   // A load that waited for the transaction's own connection would time out quickly
   let config = SqliteDatabaseConfig {
      acquire_timeout_secs: 1,
      ..Default::default()
   };
   let repository = Repository::open(
      MemoryLocator::new().with_config(config),
      Settings::new(Catalog::new().with(&node)),
   )
   .await
   .unwrap();

   let root = Entity::new(&node);
   root.set(&label, "root".to_string()).await.unwrap();
   repository.insert(&root).await.unwrap();
   let leaf = Entity::new(&node);
   leaf.set(&label, "leaf".to_string()).await.unwrap();
   leaf.set(&parent, Some(root.clone())).await.unwrap();
   repository.insert(&leaf).await.unwrap();
   root.set(&children, vec![leaf.clone()]).await.unwrap();
   repository.update(&root).await.unwrap();

   let mut tx = repository.begin().await.unwrap();
   let loaded = tx.lookup(&leaf.reference().unwrap()).await.unwrap();
   root.set(&label, "renamed".to_string()).await.unwrap();
   tx.update(&root).await.unwrap();

   // Loads see the transaction's uncommitted rows
   let up = loaded.get(&parent).await.unwrap().unwrap();
   assert_eq!(up.get(&label).await.unwrap(), "renamed");
   let down = up.get(&children).await.unwrap();
   let ids: Vec<i64> = down.iter().map(Entity::id).collect();
   assert_eq!(ids, [leaf.id()]);
   tx.rollback().await.unwrap();

   // Once the transaction is over they go through the repository
   let mut tx = repository.begin().await.unwrap();
   let later = tx.lookup(&leaf.reference().unwrap()).await.unwrap();
   tx.commit().await.unwrap();
   let up = later.get(&parent).await.unwrap().unwrap();
   assert_eq!(up.get(&label).await.unwrap(), "root");
}

use crate::{
    auth::user,
    db::{unique_violation_error, DbPool},
    entities::{menu, menu_grant},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

const DUPLICATE_GRANT: &str = "Menu is already granted to this account";

/// Fields accepted when creating or replacing a menu entry.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MenuInput {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(max = 200, message = "URL cannot exceed 200 characters"))]
    pub url: Option<String>,
    #[validate(length(max = 50, message = "Icon class cannot exceed 50 characters"))]
    pub icon_class: Option<String>,
    #[serde(default)]
    pub display_order: i32,
    pub parent_menu_id: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// A menu with the visible menus nested under it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuNode {
    #[serde(flatten)]
    pub menu: menu::Model,
    pub children: Vec<MenuNode>,
}

/// Parent links of every menu, keyed by menu id.
#[derive(Debug, Clone, Default)]
pub struct MenuArena {
    parents: HashMap<i32, Option<i32>>,
}

impl MenuArena {
    pub fn from_links<I>(links: I) -> Self
    where
        I: IntoIterator<Item = (i32, Option<i32>)>,
    {
        Self {
            parents: links.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: i32) -> bool {
        self.parents.contains_key(&id)
    }

    /// True when making `new_parent` the parent of `menu_id` would close a
    /// loop, i.e. `menu_id` is `new_parent` or one of its ancestors.
    pub fn would_create_cycle(&self, menu_id: i32, new_parent: i32) -> bool {
        let mut seen = HashSet::new();
        let mut current = Some(new_parent);
        while let Some(id) = current {
            if id == menu_id {
                return true;
            }
            // A loop that does not involve `menu_id` is already in the data.
            if !seen.insert(id) {
                return true;
            }
            current = self.parents.get(&id).copied().flatten();
        }
        false
    }

    /// Every menu below `root`, children before their parents.
    pub fn descendants(&self, root: i32) -> Vec<i32> {
        let mut children: HashMap<i32, Vec<i32>> = HashMap::new();
        for (&id, &parent) in &self.parents {
            if let Some(parent) = parent {
                children.entry(parent).or_default().push(id);
            }
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }

        let mut order = Vec::new();
        let mut visited = HashSet::from([root]);
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                if id != root {
                    order.push(id);
                }
                continue;
            }
            stack.push((id, true));
            for &child in children.get(&id).map(Vec::as_slice).unwrap_or_default() {
                if visited.insert(child) {
                    stack.push((child, false));
                }
            }
        }
        order
    }
}

/// Nests menus under their parents. Input order is kept among siblings; a
/// menu whose parent is not in `menus` becomes a root.
pub fn build_menu_tree(menus: Vec<menu::Model>) -> Vec<MenuNode> {
    let visible: HashSet<i32> = menus.iter().map(|m| m.id).collect();
    let mut children: HashMap<i32, Vec<menu::Model>> = HashMap::new();
    let mut roots = Vec::new();

    for menu in menus {
        match menu.parent_menu_id {
            Some(parent) if parent != menu.id && visible.contains(&parent) => {
                children.entry(parent).or_default().push(menu)
            }
            _ => roots.push(menu),
        }
    }

    fn attach(menu: menu::Model, children: &mut HashMap<i32, Vec<menu::Model>>) -> MenuNode {
        let kids = children.remove(&menu.id).unwrap_or_default();
        MenuNode {
            children: kids.into_iter().map(|kid| attach(kid, children)).collect(),
            menu,
        }
    }

    roots
        .into_iter()
        .map(|root| attach(root, &mut children))
        .collect()
}

/// Navigation menus and the per-account grants that make them visible.
#[derive(Debug, Clone)]
pub struct MenuService {
    db: Arc<DbPool>,
}

impl MenuService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Active menus granted to `principal_id` through active grants, ordered
    /// by display order. No grants means an empty list.
    #[instrument(skip(self))]
    pub async fn resolve_menus_for(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<menu::Model>, ServiceError> {
        Ok(menu::Entity::find()
            .join(JoinType::InnerJoin, menu::Relation::MenuGrant.def())
            .filter(menu_grant::Column::UserId.eq(principal_id))
            .filter(menu_grant::Column::IsActive.eq(true))
            .filter(menu::Column::IsActive.eq(true))
            .order_by_asc(menu::Column::DisplayOrder)
            .order_by_asc(menu::Column::Id)
            .all(&*self.db)
            .await?)
    }

    /// The resolved menus nested by parent.
    pub async fn resolve_menu_tree_for(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<MenuNode>, ServiceError> {
        let menus = self.resolve_menus_for(principal_id).await?;
        Ok(build_menu_tree(menus))
    }

    pub async fn list_menus(&self) -> Result<Vec<menu::Model>, ServiceError> {
        Ok(menu::Entity::find()
            .order_by_asc(menu::Column::DisplayOrder)
            .order_by_asc(menu::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn get_menu(&self, id: i32) -> Result<menu::Model, ServiceError> {
        menu::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| menu_not_found(id))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_menu(&self, input: MenuInput) -> Result<menu::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        if let Some(parent) = input.parent_menu_id {
            ensure_parent_exists(db, parent).await?;
        }

        let model = menu::ActiveModel {
            name: Set(input.name.trim().to_string()),
            url: Set(input.url),
            icon_class: Set(input.icon_class),
            display_order: Set(input.display_order),
            parent_menu_id: Set(input.parent_menu_id),
            is_active: Set(input.is_active),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(menu_id = model.id, "Menu created");
        Ok(model)
    }

    /// Replaces a menu's fields. Re-parenting under itself or one of its own
    /// descendants is rejected.
    #[instrument(skip(self, input), fields(menu_id = id))]
    pub async fn update_menu(&self, id: i32, input: MenuInput) -> Result<menu::Model, ServiceError> {
        input.validate()?;
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let existing = menu::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| menu_not_found(id))?;

        if let Some(parent) = input.parent_menu_id {
            ensure_parent_exists(&txn, parent).await?;
            let arena = load_arena(&txn).await?;
            if arena.would_create_cycle(id, parent) {
                return Err(ServiceError::invalid_field(
                    "parent_menu_id",
                    format!("Menu {} cannot be placed under menu {}", id, parent),
                ));
            }
        }

        let mut active: menu::ActiveModel = existing.into();
        active.name = Set(input.name.trim().to_string());
        active.url = Set(input.url);
        active.icon_class = Set(input.icon_class);
        active.display_order = Set(input.display_order);
        active.parent_menu_id = Set(input.parent_menu_id);
        active.is_active = Set(input.is_active);
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        info!(menu_id = id, "Menu updated");
        Ok(updated)
    }

    /// Deletes a menu and its grants. A menu with children is only deleted
    /// with `cascade`, which removes the whole subtree. Returns the ids of
    /// the deleted menus.
    #[instrument(skip(self))]
    pub async fn delete_menu(&self, id: i32, cascade: bool) -> Result<Vec<i32>, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let arena = load_arena(&txn).await?;
        if !arena.contains(id) {
            return Err(menu_not_found(id));
        }

        let mut doomed = arena.descendants(id);
        if !doomed.is_empty() && !cascade {
            warn!(menu_id = id, children = doomed.len(), "Refusing to orphan child menus");
            return Err(ServiceError::Conflict(format!(
                "Menu {} has {} child menu(s); delete them first or cascade",
                id,
                doomed.len()
            )));
        }
        doomed.push(id);

        menu_grant::Entity::delete_many()
            .filter(menu_grant::Column::MenuId.is_in(doomed.iter().copied()))
            .exec(&txn)
            .await?;
        // Leaves first: the parent link is RESTRICT.
        for menu_id in &doomed {
            menu::Entity::delete_by_id(*menu_id).exec(&txn).await?;
        }

        txn.commit().await?;
        info!(menu_id = id, deleted = doomed.len(), "Menu deleted");
        Ok(doomed)
    }

    /// Makes a menu visible to an account. An inactive grant is reactivated;
    /// an active one is a validation error.
    #[instrument(skip(self))]
    pub async fn grant_menu(
        &self,
        principal_id: Uuid,
        menu_id: i32,
        assigned_by: Option<String>,
    ) -> Result<menu_grant::Model, ServiceError> {
        let db = &*self.db;

        if user::Entity::find_by_id(principal_id).one(db).await?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "Account {} not found",
                principal_id
            )));
        }
        self.get_menu(menu_id).await?;

        let existing = menu_grant::Entity::find()
            .filter(menu_grant::Column::UserId.eq(principal_id))
            .filter(menu_grant::Column::MenuId.eq(menu_id))
            .one(db)
            .await?;

        let grant = match existing {
            Some(grant) if grant.is_active => {
                return Err(ServiceError::invalid_field("menu_id", DUPLICATE_GRANT))
            }
            Some(grant) => {
                let mut active: menu_grant::ActiveModel = grant.into();
                active.is_active = Set(true);
                active.assigned_date = Set(Utc::now());
                active.assigned_by = Set(assigned_by);
                active.update(db).await?
            }
            None => {
                menu_grant::ActiveModel {
                    user_id: Set(principal_id),
                    menu_id: Set(menu_id),
                    assigned_date: Set(Utc::now()),
                    assigned_by: Set(assigned_by),
                    is_active: Set(true),
                    ..Default::default()
                }
                .insert(db)
                .await
                .map_err(|e| unique_violation_error(e, "menu_id", DUPLICATE_GRANT))?
            }
        };

        info!(principal_id = %principal_id, menu_id, "Menu granted");
        Ok(grant)
    }

    /// Deactivates an active grant.
    #[instrument(skip(self))]
    pub async fn revoke_menu(&self, principal_id: Uuid, menu_id: i32) -> Result<(), ServiceError> {
        let result = menu_grant::Entity::update_many()
            .col_expr(menu_grant::Column::IsActive, Expr::value(false))
            .filter(menu_grant::Column::UserId.eq(principal_id))
            .filter(menu_grant::Column::MenuId.eq(menu_id))
            .filter(menu_grant::Column::IsActive.eq(true))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "No active grant of menu {} for account {}",
                menu_id, principal_id
            )));
        }

        info!(principal_id = %principal_id, menu_id, "Menu grant revoked");
        Ok(())
    }
}

fn menu_not_found(id: i32) -> ServiceError {
    ServiceError::NotFound(format!("Menu {} not found", id))
}

async fn ensure_parent_exists<C>(conn: &C, parent: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if menu::Entity::find_by_id(parent).one(conn).await?.is_none() {
        return Err(ServiceError::invalid_field(
            "parent_menu_id",
            format!("Parent menu {} does not exist", parent),
        ));
    }
    Ok(())
}

async fn load_arena<C>(conn: &C) -> Result<MenuArena, ServiceError>
where
    C: ConnectionTrait,
{
    let links: Vec<(i32, Option<i32>)> = menu::Entity::find()
        .select_only()
        .column(menu::Column::Id)
        .column(menu::Column::ParentMenuId)
        .into_tuple()
        .all(conn)
        .await?;
    Ok(MenuArena::from_links(links))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn menu(id: i32, parent: Option<i32>, display_order: i32) -> menu::Model {
        menu::Model {
            id,
            name: format!("Menu {id}"),
            url: None,
            icon_class: None,
            display_order,
            parent_menu_id: parent,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn arena() -> MenuArena {
        // 1 ─ 2 ─ 4
        //   └ 3
        // 5
        MenuArena::from_links([(1, None), (2, Some(1)), (3, Some(1)), (4, Some(2)), (5, None)])
    }

    #[test]
    fn detects_cycles_through_ancestors() {
        let arena = arena();
        assert!(arena.would_create_cycle(1, 4));
        assert!(arena.would_create_cycle(2, 2));
        assert!(!arena.would_create_cycle(4, 3));
        assert!(!arena.would_create_cycle(1, 5));
    }

    #[test]
    fn descendants_come_leaves_first() {
        let order = arena().descendants(1);
        assert_eq!(order.len(), 3);
        let pos = |id| order.iter().position(|&x| x == id).unwrap();
        assert!(pos(4) < pos(2));
        assert!(arena().descendants(5).is_empty());
    }

    #[test]
    fn tree_nests_children_and_promotes_orphans() {
        let tree = build_menu_tree(vec![
            menu(1, None, 1),
            menu(2, Some(1), 2),
            menu(7, Some(99), 3),
            menu(3, Some(1), 4),
        ]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].menu.id, 1);
        let kids: Vec<i32> = tree[0].children.iter().map(|n| n.menu.id).collect();
        assert_eq!(kids, vec![2, 3]);
        assert_eq!(tree[1].menu.id, 7);
    }

    proptest! {
        #[test]
        fn accepted_reparenting_never_creates_a_cycle(
            parents in proptest::collection::vec(proptest::option::of(0usize..10), 10),
            moves in proptest::collection::vec((0i32..10, 0i32..10), 1..20),
        ) {
            // Start from a forest: each menu may only point at a lower id.
            let mut links: HashMap<i32, Option<i32>> = parents
                .iter()
                .enumerate()
                .map(|(id, parent)| {
                    let parent = parent.filter(|p| *p < id).map(|p| p as i32);
                    (id as i32, parent)
                })
                .collect();

            for (menu_id, new_parent) in moves {
                let arena = MenuArena::from_links(links.clone());
                if !arena.would_create_cycle(menu_id, new_parent) {
                    links.insert(menu_id, Some(new_parent));
                }
            }

            // Walking up from any menu must reach a root.
            for &start in links.keys() {
                let mut steps = 0;
                let mut current = links[&start];
                while let Some(id) = current {
                    steps += 1;
                    prop_assert!(steps <= links.len());
                    current = links[&id];
                }
            }
        }
    }
}

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::api::catalog_dto::CatalogDto;
use crate::config::SchedulerConfig;
use crate::domain::activity::activity::Activity;
use crate::domain::activity::duration::parse_hms;
use crate::domain::allocator::composite_allocator::{CompositeAllocation, CompositeAllocator, GroupCompanions};
use crate::domain::manager::equipment_manager::EquipmentManager;
use crate::domain::manager::reservation_book::PendingGroupStatus;
use crate::domain::manager::resource_manager::{AllocationRequest, ResourceManager};
use crate::domain::manager::staff_pool::StaffPool;
use crate::domain::resource::category::{CategoryConfig, EquipmentCategory, SupportsBatching};
use crate::domain::resource::equipment::Equipment;
use crate::domain::resource::equipment_store::EquipmentStore;
use crate::domain::resource::staff::StaffMember;
use crate::domain::simulator::simulator::SystemSimulator;
use crate::domain::utils::id::{ActivityId, EquipmentId, OrderId, Timestamp};
use crate::error::{Error, Result};

/// One committed share on the equipment agenda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaEntry {
    pub equipment_id: EquipmentId,
    pub equipment_name: String,
    pub category: EquipmentCategory,
    pub order_id: OrderId,
    pub activity_id: ActivityId,
    pub quantity: i64,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// The production floor: every unit in one arena, one manager per category, the staff pool
/// and the read-only activity catalog.
#[derive(Debug)]
pub struct ProductionSystem {
    config: SchedulerConfig,
    simulator: Arc<dyn SystemSimulator>,
    store: EquipmentStore,
    managers: BTreeMap<EquipmentCategory, EquipmentManager>,
    staff: StaffPool,
    activities: HashMap<ActivityId, Arc<Activity>>,
}

impl ProductionSystem {
    pub fn new(
        config: SchedulerConfig,
        simulator: Arc<dyn SystemSimulator>,
        store: EquipmentStore,
        categories: Vec<CategoryConfig>,
        staff: Vec<StaffMember>,
        activities: Vec<Activity>,
    ) -> Self {
        let config = config.sanitized();
        let mut configured: BTreeMap<EquipmentCategory, CategoryConfig> = categories.into_iter().map(|c| (c.category, c)).collect();

        let used: BTreeSet<EquipmentCategory> = activities.iter().flat_map(|activity| activity.equipment_requirements.keys().copied()).collect();
        for category in used {
            configured.entry(category).or_insert_with(|| CategoryConfig::direct_only(category));
        }

        let managers = configured
            .into_values()
            .map(|category| (category.category, EquipmentManager::new(category, store.clone(), config.granularity_s, simulator.clone())))
            .collect();

        Self {
            staff: StaffPool::new(staff, config.granularity_s),
            activities: activities.into_iter().map(|activity| (activity.id, Arc::new(activity))).collect(),
            config,
            simulator,
            store,
            managers,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.simulator.get_current_time_in_s()
    }

    pub fn store(&self) -> &EquipmentStore {
        &self.store
    }

    pub fn staff(&self) -> &StaffPool {
        &self.staff
    }

    pub fn activity(&self, id: ActivityId) -> Result<&Arc<Activity>> {
        self.activities.get(&id).ok_or(Error::UnknownActivity(id))
    }

    pub fn activities(&self) -> &HashMap<ActivityId, Arc<Activity>> {
        &self.activities
    }

    pub fn manager(&self, category: EquipmentCategory) -> Result<&EquipmentManager> {
        self.managers.get(&category).ok_or(Error::NoManagerForCategory(category))
    }

    pub fn equipment_managers(&self) -> impl Iterator<Item = &EquipmentManager> {
        self.managers.values()
    }

    /// Every manager, equipment categories first, staff last.
    pub fn all_managers(&self) -> Vec<&dyn ResourceManager> {
        let mut managers: Vec<&dyn ResourceManager> = self.managers.values().map(|manager| manager as &dyn ResourceManager).collect();
        managers.push(&self.staff);
        managers
    }

    /// Managers an activity needs for a direct allocation, skipping the given categories.
    pub fn managers_for(&self, activity: &Activity, skip: &[EquipmentCategory]) -> Result<Vec<&dyn ResourceManager>> {
        let mut managers: Vec<&dyn ResourceManager> = Vec::new();

        for category in activity.equipment_requirements.keys().filter(|category| !skip.contains(category)) {
            managers.push(self.manager(*category)?);
        }
        if activity.needs_staff() {
            managers.push(&self.staff);
        }

        Ok(managers)
    }

    /// What a batched activity needs besides `category`, committed per member when its group is promoted.
    pub fn companions<'s>(&'s self, activity: &'s Activity, category: EquipmentCategory) -> Result<GroupCompanions<'s>> {
        Ok(GroupCompanions::new(self.managers_for(activity, &[category])?, activity, self.config.granularity_s))
    }

    /// Standalone allocation of one activity, searched back from `not_after` over the configured horizon.
    pub fn allocate(&self, order_id: OrderId, activity_id: ActivityId, quantity: i64, not_after: Timestamp) -> Result<CompositeAllocation> {
        let activity = self.activity(activity_id)?;
        let managers = self.managers_for(activity, &[])?;
        let request = AllocationRequest::new(order_id, activity, quantity, not_after - self.config.search_horizon_s, not_after);

        CompositeAllocator::new(managers, self.config.granularity_s).allocate(&request)
    }

    pub fn release_by_order(&self, order_id: OrderId) -> usize {
        self.all_managers().iter().map(|manager| manager.release_by_order(order_id)).sum()
    }

    pub fn release_by_activity(&self, activity_id: ActivityId, order_id: OrderId) -> usize {
        self.all_managers().iter().map(|manager| manager.release_by_activity(activity_id, order_id)).sum()
    }

    pub fn release_finished(&self, now: Timestamp) -> usize {
        let released: usize = self.all_managers().iter().map(|manager| manager.release_finished(now)).sum();
        log::info!("Released {} finished occupations.", released);
        released
    }

    pub fn expire_sweep(&self, now: Timestamp) -> usize {
        self.managers.values().map(|manager| manager.expire_sweep(now)).sum()
    }

    pub fn reservation_status(&self) -> Vec<PendingGroupStatus> {
        self.managers.values().flat_map(|manager| manager.pending_groups(&self.activities)).collect()
    }

    /// Every committed share of every unit, ordered by unit id then start.
    pub fn agenda(&self) -> Vec<AgendaEntry> {
        let mut entries = Vec::new();

        for manager in self.managers.values() {
            for key in manager.unit_keys() {
                self.store.with_equipment(*key, |unit| {
                    for occupation in unit.occupations() {
                        for share in &occupation.shares {
                            entries.push(AgendaEntry {
                                equipment_id: unit.id,
                                equipment_name: unit.name.clone(),
                                category: unit.category,
                                order_id: share.order_id,
                                activity_id: occupation.activity_id,
                                quantity: share.quantity,
                                start: occupation.start,
                                end: occupation.end,
                            });
                        }
                    }
                });
            }
        }

        entries.sort_by_key(|entry| (entry.equipment_id, entry.start, entry.order_id));
        entries
    }
}

impl TryFrom<(CatalogDto, Arc<dyn SystemSimulator>)> for ProductionSystem {
    type Error = Error;

    fn try_from(args: (CatalogDto, Arc<dyn SystemSimulator>)) -> Result<Self> {
        let (dto, simulator) = args;
        let config = dto.configuracao.sanitized();

        let categories = dto
            .categorias
            .into_iter()
            .map(|category| {
                let batching = if category.suporta_agrupamento {
                    let timeout = category.timeout_reserva.as_deref().map(parse_hms).transpose()?;
                    SupportsBatching::Yes { reservation_timeout_s: timeout.unwrap_or(config.default_reservation_timeout_s) }
                } else {
                    SupportsBatching::No
                };
                Ok(CategoryConfig { category: category.tipo, batching })
            })
            .collect::<Result<Vec<_>>>()?;

        let store = EquipmentStore::new();
        for equipment_dto in dto.equipamentos {
            store.add(Equipment::try_from(equipment_dto)?);
        }

        let activities = dto.atividades.into_iter().map(Activity::try_from).collect::<Result<Vec<_>>>()?;

        for activity in &activities {
            for equipment_id in &activity.eligible_equipment {
                let Some(key) = store.key_of(*equipment_id) else {
                    return Err(Error::ModelConstructionError(format!("activity {} refers to unknown equipment {}", activity.id, equipment_id)));
                };
                let category = store.with_equipment(key, |unit| unit.category);
                if category.is_some_and(|category| !activity.equipment_requirements.contains_key(&category)) {
                    log::warn!("Activity {} lists equipment {} whose category it does not require.", activity.id, equipment_id);
                }
            }
        }

        let staff: Vec<StaffMember> = dto.funcionarios.into_iter().map(StaffMember::from).collect();

        log::info!("Catalog loaded: {} units, {} staff, {} activities.", store.len(), staff.len(), activities.len());
        Ok(ProductionSystem::new(config, simulator, store, categories, staff, activities))
    }
}

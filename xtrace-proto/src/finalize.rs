// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Lowers a parsed [`DescriptorSet`] into the immutable [`Protocol`]
//! tables a connection runs against.
//!
//! Grounded on the `finalize_data`/`finalize_parameters`/`finalize_value`
//! family of functions in `translate.c`: walk every namespace once,
//! flatten its requests/events/errors into opcode-indexed arrays (filling
//! any opcode nobody defined with an `<unsupported>` placeholder, exactly
//! as the original fills gaps so array indexing by raw opcode byte is
//! always in-bounds), and recursively resolve nested parameter lists and
//! constant sets into `Arc`-shared immutable nodes.

use std::collections::HashMap;
use std::sync::Arc;

use crate::arena::Id;
use crate::model::{self, DescriptorSet};
use crate::tables::{self, Protocol};

pub fn finalize(descriptors: &DescriptorSet) -> Protocol {
	let mut constant_cache: HashMap<*const model::ConstantSet, Arc<tables::ConstantSet>> =
		HashMap::new();
	let mut list_cache: HashMap<*const model::ParameterList, Arc<[tables::Parameter]>> =
		HashMap::new();

	let mut core_requests: Vec<tables::Request> = Vec::new();
	let mut core_events: Vec<tables::Event> = Vec::new();
	let mut core_errors: Vec<Arc<str>> = Vec::new();
	let mut setup = None;
	let mut extensions = Vec::new();

	for namespace in &descriptors.namespaces {
		let requests = finalize_requests(descriptors, namespace, &mut constant_cache, &mut list_cache);
		let events = finalize_events(descriptors, namespace, &mut constant_cache, &mut list_cache);
		let errors: Vec<Arc<str>> = namespace.errors.iter().map(|e| Arc::from(e.as_str())).collect();

		if let Some(setup_id) = namespace.setup {
			let list = resolve_parameter_list(descriptors, setup_id, &mut constant_cache, &mut list_cache);
			setup = Some(list);
		}

		if let Some(extension_name) = &namespace.extension_name {
			let (xge, normal): (Vec<_>, Vec<_>) = events.into_iter().partition(|e| e.is_generic);
			extensions.push(tables::Extension {
				name: Arc::from(extension_name.as_str()),
				requests: requests.into(),
				events: normal.into(),
				errors: errors.into(),
				xge_events: xge.into(),
			});
		} else {
			core_requests = requests;
			core_events = events;
			core_errors = errors;
		}
	}

	let unexpected_reply: Arc<[tables::Parameter]> = Arc::from(Vec::new());

	Protocol {
		requests: core_requests.into(),
		events: core_events.into(),
		errors: core_errors.into(),
		extensions: extensions.into(),
		setup,
		unexpected_reply,
	}
}

fn finalize_requests(
	descriptors: &DescriptorSet,
	namespace: &model::Namespace,
	constant_cache: &mut HashMap<*const model::ConstantSet, Arc<tables::ConstantSet>>,
	list_cache: &mut HashMap<*const model::ParameterList, Arc<[tables::Parameter]>>,
) -> Vec<tables::Request> {
	let max_opcode = namespace
		.requests
		.iter()
		.map(|r| r.opcode)
		.max()
		.unwrap_or(0);
	let mut slots: Vec<Option<tables::Request>> = (0..=max_opcode).map(|_| None).collect();

	for request in &namespace.requests {
		let body = finalize_body(descriptors, &request.request, constant_cache, list_cache);
		let response = request
			.response
			.as_ref()
			.map(|body| finalize_body(descriptors, body, constant_cache, list_cache));
		let (body, response) = apply_known_specials(&request.name, body, response);
		let finalized = tables::Request {
			name: Arc::from(request.name.as_str()),
			opcode: request.opcode,
			request: body,
			response,
		};
		slots[request.opcode as usize] = Some(finalized);
	}

	slots
		.into_iter()
		.enumerate()
		.map(|(opcode, slot)| {
			slot.unwrap_or_else(|| tables::Request {
				name: Arc::from("<unsupported>"),
				opcode: opcode as u16,
				request: tables::Body::Parameters(Arc::from(Vec::new())),
				response: None,
			})
		})
		.collect()
}

/// Mirrors `translate.c`'s hardcoded `strcmp(rs[i].name, "QueryExtension")`
/// dispatch in `finalize_data`: a handful of request names get their
/// request/reply hook wired by name, regardless of how their body was
/// declared in `.proto`, the same way the original overrides
/// `request_func`/`reply_func` after the data-driven parse runs.
/// `ListFontsWithInfo` only overrides its reply — unlike the other two,
/// its request carries ordinary fields the printer renders ordinarily.
fn apply_known_specials(
	name: &str,
	request: tables::Body,
	response: Option<tables::Body>,
) -> (tables::Body, Option<tables::Body>) {
	match name {
		"QueryExtension" => (
			tables::Body::Special(tables::SpecialHook::RequestQueryExtension),
			response.map(|_| tables::Body::Special(tables::SpecialHook::ReplyQueryExtension)),
		),
		"InternAtom" => (
			tables::Body::Special(tables::SpecialHook::RequestInternAtom),
			response.map(|_| tables::Body::Special(tables::SpecialHook::ReplyInternAtom)),
		),
		"ListFontsWithInfo" => (
			request,
			response.map(|_| tables::Body::Special(tables::SpecialHook::ReplyListFontsWithInfo)),
		),
		_ => (request, response),
	}
}

fn finalize_events(
	descriptors: &DescriptorSet,
	namespace: &model::Namespace,
	constant_cache: &mut HashMap<*const model::ConstantSet, Arc<tables::ConstantSet>>,
	list_cache: &mut HashMap<*const model::ParameterList, Arc<[tables::Parameter]>>,
) -> Vec<tables::Event> {
	let max_code = namespace.events.iter().map(|e| e.code).max().unwrap_or(0);
	let mut slots: Vec<Option<tables::Event>> = (0..=max_code).map(|_| None).collect();

	for event in &namespace.events {
		let finalized = tables::Event {
			name: Arc::from(event.name.as_str()),
			code: event.code,
			is_generic: event.is_generic,
			body: finalize_body(descriptors, &event.body, constant_cache, list_cache),
		};
		slots[event.code as usize] = Some(finalized);
	}

	slots
		.into_iter()
		.enumerate()
		.map(|(code, slot)| {
			slot.unwrap_or_else(|| tables::Event {
				name: Arc::from("<unsupported>"),
				code: code as u16,
				is_generic: false,
				body: tables::Body::Parameters(Arc::from(Vec::new())),
			})
		})
		.collect()
}

fn finalize_body(
	descriptors: &DescriptorSet,
	body: &model::Body,
	constant_cache: &mut HashMap<*const model::ConstantSet, Arc<tables::ConstantSet>>,
	list_cache: &mut HashMap<*const model::ParameterList, Arc<[tables::Parameter]>>,
) -> tables::Body {
	match body {
		model::Body::Special(hook) => {
			let resolved = tables::SpecialHook::by_name(&hook.0)
				.unwrap_or_else(|| panic!("unknown special hook {:?}", hook.0));
			tables::Body::Special(resolved)
		}
		model::Body::Parameters(id) => tables::Body::Parameters(resolve_parameter_list(
			descriptors,
			*id,
			constant_cache,
			list_cache,
		)),
	}
}

fn resolve_parameter_list(
	descriptors: &DescriptorSet,
	id: Id<model::ParameterList>,
	constant_cache: &mut HashMap<*const model::ConstantSet, Arc<tables::ConstantSet>>,
	list_cache: &mut HashMap<*const model::ParameterList, Arc<[tables::Parameter]>>,
) -> Arc<[tables::Parameter]> {
	let list = descriptors.parameter_lists.get(id);
	let key = list as *const model::ParameterList;
	if let Some(cached) = list_cache.get(&key) {
		return cached.clone();
	}

	let resolved: Vec<tables::Parameter> = list
		.parameters
		.iter()
		.map(|p| tables::Parameter {
			offset: p.offset,
			name: p.name.as_deref().map(Arc::from),
			type_spec: resolve_type_spec(descriptors, &p.type_spec, constant_cache, list_cache),
		})
		.collect();
	let arc: Arc<[tables::Parameter]> = resolved.into();
	list_cache.insert(key, arc.clone());
	arc
}

fn resolve_constant_set(
	descriptors: &DescriptorSet,
	id: Id<model::ConstantSet>,
	constant_cache: &mut HashMap<*const model::ConstantSet, Arc<tables::ConstantSet>>,
) -> Arc<tables::ConstantSet> {
	let set = descriptors.constant_sets.get(id);
	let key = set as *const model::ConstantSet;
	if let Some(cached) = constant_cache.get(&key) {
		return cached.clone();
	}
	let resolved = Arc::new(tables::ConstantSet {
		name: Arc::from(set.name.as_str()),
		constants: set
			.constants
			.iter()
			.map(|c| tables::Constant {
				value: c.value,
				name: Arc::from(c.name.as_str()),
			})
			.collect(),
		bitmask: set.bitmask,
	});
	constant_cache.insert(key, resolved.clone());
	resolved
}

fn resolve_type_spec(
	descriptors: &DescriptorSet,
	type_spec: &model::TypeSpec,
	constant_cache: &mut HashMap<*const model::ConstantSet, Arc<tables::ConstantSet>>,
	list_cache: &mut HashMap<*const model::ParameterList, Arc<[tables::Parameter]>>,
) -> tables::TypeSpec {
	match type_spec {
		model::TypeSpec::Elementary(t) => tables::TypeSpec::Elementary(*t),
		model::TypeSpec::WithConstants(t, id) => {
			tables::TypeSpec::WithConstants(*t, resolve_constant_set(descriptors, *id, constant_cache))
		}
		model::TypeSpec::WithValues(t, values) => {
			let resolved: Vec<tables::ValueField> = values
				.iter()
				.map(|v| tables::ValueField {
					flag: v.flag,
					name: Arc::from(v.name.as_str()),
					field_type: v.field_type,
					constants: v
						.constants
						.map(|id| resolve_constant_set(descriptors, id, constant_cache)),
				})
				.collect();
			tables::TypeSpec::WithValues(*t, resolved.into())
		}
		model::TypeSpec::WithParameters(t, id) => tables::TypeSpec::WithParameters(
			*t,
			resolve_parameter_list(descriptors, *id, constant_cache, list_cache),
		),
		model::TypeSpec::Conditional { clauses, otherwise } => tables::TypeSpec::Conditional {
			clauses: clauses
				.iter()
				.map(|clause| tables::IfClause {
					offset: clause.offset,
					field_type: clause.field_type,
					value: match &clause.value {
						model::IfValue::Number(n) => tables::IfValue::Number(*n),
						model::IfValue::AtomName(name) => tables::IfValue::AtomName(Arc::from(name.as_str())),
					},
					body: resolve_parameter_list(descriptors, clause.body, constant_cache, list_cache),
				})
				.collect(),
			otherwise: otherwise
				.map(|id| resolve_parameter_list(descriptors, id, constant_cache, list_cache)),
		},
	}
}

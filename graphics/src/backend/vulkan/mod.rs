//! Native Vulkan backend implementation using ash.
//!
//! The backend does not create the instance, device or swapchain. A bootstrap
//! layer (window and surface setup) creates them and hands them over in a
//! [`VulkanBackendDesc`]; it also destroys them after the backend is dropped.
//!
//! Frame-core handles are the raw Vulkan handles, so no lookup is needed for
//! most objects. Buffers and images are the exception: their gpu-allocator
//! allocations are tracked by handle and freed on destroy.
//!
//! Requires Vulkan 1.2 buffer device addresses and `VK_KHR_dynamic_rendering`.

mod allocator;
mod command;
pub(crate) mod conversion;

use std::collections::HashMap;
use std::time::Duration;

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use parking_lot::Mutex;

use super::GpuBackend;
use crate::error::GraphicsError;
use crate::types::{
    BufferCopy, BufferDescriptor, BufferHandle, BufferUsage, CommandBufferHandle,
    CommandPoolHandle, DescriptorBinding, DescriptorPoolHandle, DescriptorPoolSize,
    DescriptorResource, DescriptorSetHandle, DescriptorSetLayoutHandle, DescriptorWrite,
    FenceHandle, ImageDescriptor, ImageHandle, ImageLayout, ImageViewHandle, PipelineHandle,
    PipelineLayoutHandle, RenderingInfo, SamplerHandle, SemaphoreHandle, ShaderStages, SubmitInfo,
};

use self::conversion::{
    convert_buffer_usage, convert_descriptor_type, convert_image_format, convert_image_layout,
    convert_image_usage, convert_memory_location, convert_result, convert_shader_stages,
    image_aspect, to_vk,
};

/// Objects created by the bootstrap layer that the backend renders with.
pub struct VulkanBackendDesc {
    /// Vulkan instance.
    pub instance: ash::Instance,
    /// Physical device the logical device was created on.
    pub physical_device: vk::PhysicalDevice,
    /// Logical device.
    pub device: ash::Device,
    /// Queue used for graphics, transfer and present.
    pub graphics_queue: vk::Queue,
    /// Family of `graphics_queue`.
    pub graphics_queue_family: u32,
    /// Swapchain rendered into.
    pub swapchain: vk::SwapchainKHR,
    /// Swapchain images, by image index.
    pub swapchain_images: Vec<vk::Image>,
    /// One color view per swapchain image.
    pub swapchain_image_views: Vec<vk::ImageView>,
    /// Whether the device was created with `bufferDeviceAddress` enabled.
    pub buffer_device_address: bool,
}

impl std::fmt::Debug for VulkanBackendDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackendDesc")
            .field("graphics_queue_family", &self.graphics_queue_family)
            .field("swapchain_images", &self.swapchain_images.len())
            .field("buffer_device_address", &self.buffer_device_address)
            .finish()
    }
}

/// A buffer and the memory bound to it.
struct VulkanBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
    usage: BufferUsage,
}

/// An image created by the backend and the memory bound to it.
struct VulkanImage {
    image: vk::Image,
    allocation: Allocation,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
}

/// Vulkan-based GPU backend using ash.
///
/// This backend provides:
/// - gpu-allocator for buffer and image memory
/// - Dynamic rendering (VK_KHR_dynamic_rendering) into swapchain images
/// - Bounded fence and acquire waits reported as [`GraphicsError::Timeout`]
pub struct VulkanBackend {
    /// Logical device.
    device: ash::Device,
    /// Graphics queue.
    graphics_queue: vk::Queue,
    /// Graphics queue family index.
    graphics_queue_family: u32,
    /// Memory allocator.
    allocator: Mutex<Allocator>,
    /// Live buffers and their allocations.
    buffers: Mutex<HashMap<BufferHandle, VulkanBuffer>>,
    /// Live images and their allocations.
    images: Mutex<HashMap<ImageHandle, VulkanImage>>,
    /// Dynamic rendering extension.
    dynamic_rendering: ash::khr::dynamic_rendering::Device,
    /// Swapchain extension.
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
}

impl std::fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("graphics_queue_family", &self.graphics_queue_family)
            .field("swapchain_images", &self.swapchain_images.len())
            .finish()
    }
}

impl VulkanBackend {
    /// Create the backend on objects owned by the bootstrap layer.
    pub fn new(desc: VulkanBackendDesc) -> Result<Self, GraphicsError> {
        if desc.swapchain_images.len() != desc.swapchain_image_views.len() {
            return Err(GraphicsError::InitializationFailed(format!(
                "{} swapchain images but {} image views",
                desc.swapchain_images.len(),
                desc.swapchain_image_views.len()
            )));
        }

        let allocator = allocator::create_allocator(
            &desc.instance,
            desc.physical_device,
            desc.device.clone(),
            desc.buffer_device_address,
        )?;

        let dynamic_rendering =
            ash::khr::dynamic_rendering::Device::new(&desc.instance, &desc.device);
        let swapchain_loader = ash::khr::swapchain::Device::new(&desc.instance, &desc.device);

        log::info!(
            "Vulkan backend initialized ({} swapchain images, buffer device address: {})",
            desc.swapchain_images.len(),
            desc.buffer_device_address
        );

        Ok(Self {
            device: desc.device,
            graphics_queue: desc.graphics_queue,
            graphics_queue_family: desc.graphics_queue_family,
            allocator: Mutex::new(allocator),
            buffers: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
            dynamic_rendering,
            swapchain_loader,
            swapchain: desc.swapchain,
            swapchain_images: desc.swapchain_images,
            swapchain_image_views: desc.swapchain_image_views,
        })
    }

    /// Get the Vulkan device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Number of swapchain images.
    pub fn swapchain_image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    fn swapchain_image(&self, image_index: u32) -> Option<(vk::Image, vk::ImageView)> {
        let index = image_index as usize;
        Some((
            *self.swapchain_images.get(index)?,
            *self.swapchain_image_views.get(index)?,
        ))
    }

    fn free_buffer(&self, buffer: VulkanBuffer) {
        unsafe { self.device.destroy_buffer(buffer.buffer, None) };
        if let Err(e) = self.allocator.lock().free(buffer.allocation) {
            log::error!("Failed to free buffer memory: {}", e);
        }
    }

    fn free_image(&self, image: VulkanImage) {
        unsafe { self.device.destroy_image(image.image, None) };
        if let Err(e) = self.allocator.lock().free(image.allocation) {
            log::error!("Failed to free image memory: {}", e);
        }
    }
}

/// Reject an image index the swapchain does not have.
fn check_image_index(image_index: u32, image_count: usize) -> Result<u32, GraphicsError> {
    if (image_index as usize) < image_count {
        Ok(image_index)
    } else {
        Err(GraphicsError::Internal(format!(
            "acquired swapchain image {} but the swapchain has {} images",
            image_index, image_count
        )))
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let leaked: Vec<VulkanBuffer> = self.buffers.lock().drain().map(|(_, b)| b).collect();
        let leaked_images: Vec<VulkanImage> =
            self.images.lock().drain().map(|(_, i)| i).collect();
        if !leaked.is_empty() || !leaked_images.is_empty() {
            log::warn!(
                "Vulkan backend dropped with {} live buffers and {} live images",
                leaked.len(),
                leaked_images.len()
            );
            unsafe {
                let _ = self.device.device_wait_idle();
            }
            for buffer in leaked {
                self.free_buffer(buffer);
            }
            for image in leaked_images {
                self.free_image(image);
            }
        }
    }
}

fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    // === Synchronization ===

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GraphicsError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { self.device.create_fence(&fence_info, None) }
            .map_err(|e| convert_result(e, "Failed to create fence"))?;
        Ok(FenceHandle::from_raw(fence.as_raw()))
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe {
            self.device
                .destroy_fence(to_vk::<vk::Fence>(fence.as_raw()), None)
        };
    }

    fn wait_fence(&self, fence: FenceHandle, timeout: Duration) -> Result<(), GraphicsError> {
        let fence = to_vk::<vk::Fence>(fence.as_raw());
        match unsafe {
            self.device
                .wait_for_fences(&[fence], true, timeout_nanos(timeout))
        } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(GraphicsError::Timeout {
                what: "fence",
                timeout,
            }),
            Err(e) => Err(convert_result(e, "Fence wait failed")),
        }
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GraphicsError> {
        let fence = to_vk::<vk::Fence>(fence.as_raw());
        unsafe { self.device.reset_fences(&[fence]) }
            .map_err(|e| convert_result(e, "Failed to reset fence"))
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, GraphicsError> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device.create_semaphore(&semaphore_info, None) }
            .map_err(|e| convert_result(e, "Failed to create semaphore"))?;
        Ok(SemaphoreHandle::from_raw(semaphore.as_raw()))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe {
            self.device
                .destroy_semaphore(to_vk::<vk::Semaphore>(semaphore.as_raw()), None)
        };
    }

    // === Command recording ===

    fn create_command_pool(&self) -> Result<CommandPoolHandle, GraphicsError> {
        let pool = command::create_command_pool(&self.device, self.graphics_queue_family)?;
        Ok(CommandPoolHandle::from_raw(pool.as_raw()))
    }

    fn destroy_command_pool(&self, pool: CommandPoolHandle) {
        unsafe {
            self.device
                .destroy_command_pool(to_vk::<vk::CommandPool>(pool.as_raw()), None)
        };
    }

    fn allocate_command_buffer(
        &self,
        pool: CommandPoolHandle,
    ) -> Result<CommandBufferHandle, GraphicsError> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(to_vk::<vk::CommandPool>(pool.as_raw()))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| convert_result(e, "Failed to allocate command buffer"))?;
        command_buffers
            .first()
            .map(|cmd| CommandBufferHandle::from_raw(cmd.as_raw()))
            .ok_or_else(|| {
                GraphicsError::ResourceCreationFailed("No command buffer allocated".to_string())
            })
    }

    fn reset_command_buffer(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<(), GraphicsError> {
        unsafe {
            self.device.reset_command_buffer(
                to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
                vk::CommandBufferResetFlags::empty(),
            )
        }
        .map_err(|e| convert_result(e, "Failed to reset command buffer"))
    }

    fn begin_command_buffer(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<(), GraphicsError> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(
                to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
                &begin_info,
            )
        }
        .map_err(|e| convert_result(e, "Failed to begin command buffer"))
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferHandle) -> Result<(), GraphicsError> {
        unsafe {
            self.device
                .end_command_buffer(to_vk::<vk::CommandBuffer>(command_buffer.as_raw()))
        }
        .map_err(|e| convert_result(e, "Failed to end command buffer"))
    }

    // === Descriptors ===

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle, GraphicsError> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(convert_descriptor_type(binding.ty))
                    .descriptor_count(binding.count)
                    .stage_flags(convert_shader_stages(binding.stages))
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe { self.device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| convert_result(e, "Failed to create descriptor set layout"))?;
        Ok(DescriptorSetLayoutHandle::from_raw(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        unsafe {
            self.device.destroy_descriptor_set_layout(
                to_vk::<vk::DescriptorSetLayout>(layout.as_raw()),
                None,
            )
        };
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorPoolHandle, GraphicsError> {
        let pool_sizes: Vec<vk::DescriptorPoolSize> = sizes
            .iter()
            .map(|size| vk::DescriptorPoolSize {
                ty: convert_descriptor_type(size.ty),
                descriptor_count: size.count,
            })
            .collect();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { self.device.create_descriptor_pool(&pool_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!(
                "Failed to create descriptor pool: {:?}",
                e
            ))
        })?;
        Ok(DescriptorPoolHandle::from_raw(pool.as_raw()))
    }

    fn reset_descriptor_pool(&self, pool: DescriptorPoolHandle) -> Result<(), GraphicsError> {
        unsafe {
            self.device.reset_descriptor_pool(
                to_vk::<vk::DescriptorPool>(pool.as_raw()),
                vk::DescriptorPoolResetFlags::empty(),
            )
        }
        .map_err(|e| convert_result(e, "Failed to reset descriptor pool"))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe {
            self.device
                .destroy_descriptor_pool(to_vk::<vk::DescriptorPool>(pool.as_raw()), None)
        };
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError> {
        let layouts = [to_vk::<vk::DescriptorSetLayout>(layout.as_raw())];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(to_vk::<vk::DescriptorPool>(pool.as_raw()))
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| convert_result(e, "Failed to allocate descriptor set"))?;
        sets.first()
            .map(|set| DescriptorSetHandle::from_raw(set.as_raw()))
            .ok_or_else(|| {
                GraphicsError::DescriptorAllocationFailed("No descriptor set allocated".to_string())
            })
    }

    fn update_descriptor_set(&self, set: DescriptorSetHandle, writes: &[DescriptorWrite]) {
        let dst_set = to_vk::<vk::DescriptorSet>(set.as_raw());
        for write in writes {
            let descriptor_type = convert_descriptor_type(write.ty);
            match write.resource {
                DescriptorResource::Buffer {
                    buffer,
                    offset,
                    size,
                } => {
                    let buffer_info = [vk::DescriptorBufferInfo {
                        buffer: to_vk::<vk::Buffer>(buffer.as_raw()),
                        offset,
                        range: size,
                    }];
                    let vk_write = vk::WriteDescriptorSet::default()
                        .dst_set(dst_set)
                        .dst_binding(write.binding)
                        .descriptor_type(descriptor_type)
                        .buffer_info(&buffer_info);
                    unsafe { self.device.update_descriptor_sets(&[vk_write], &[]) };
                }
                DescriptorResource::Image {
                    view,
                    sampler,
                    layout,
                } => {
                    let image_info = [vk::DescriptorImageInfo {
                        sampler: to_vk::<vk::Sampler>(sampler.as_raw()),
                        image_view: to_vk::<vk::ImageView>(view.as_raw()),
                        image_layout: convert_image_layout(layout),
                    }];
                    let vk_write = vk::WriteDescriptorSet::default()
                        .dst_set(dst_set)
                        .dst_binding(write.binding)
                        .descriptor_type(descriptor_type)
                        .image_info(&image_info);
                    unsafe { self.device.update_descriptor_sets(&[vk_write], &[]) };
                }
            }
        }
    }

    // === Resources ===

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle, GraphicsError> {
        if descriptor.size == 0 {
            return Err(GraphicsError::ResourceCreationFailed(
                "Cannot create a zero-sized buffer".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create buffer: {:?}", e))
        })?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name: descriptor.label.as_deref().unwrap_or("buffer"),
                requirements,
                location: convert_memory_location(descriptor.location),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                unsafe { self.device.destroy_buffer(buffer, None) };
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate buffer memory: {}",
                    e
                ))
            })?;

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        let vulkan_buffer = VulkanBuffer {
            buffer,
            allocation,
            size: descriptor.size,
            usage: descriptor.usage,
        };
        if let Err(e) = bound {
            self.free_buffer(vulkan_buffer);
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "Failed to bind buffer memory: {:?}",
                e
            )));
        }

        let handle = BufferHandle::from_raw(buffer.as_raw());
        self.buffers.lock().insert(handle, vulkan_buffer);
        Ok(handle)
    }

    fn write_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let buffers = self.buffers.lock();
        let Some(vulkan_buffer) = buffers.get(&buffer) else {
            return Err(GraphicsError::Internal(format!(
                "write_buffer called with unknown buffer {:?}",
                buffer
            )));
        };

        if offset.saturating_add(data.len() as u64) > vulkan_buffer.size {
            return Err(GraphicsError::Internal(format!(
                "write of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                vulkan_buffer.size
            )));
        }

        let Some(mapped_ptr) = vulkan_buffer.allocation.mapped_ptr() else {
            return Err(GraphicsError::Internal(
                "Buffer is not mapped for CPU access".to_string(),
            ));
        };

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn buffer_device_address(&self, buffer: BufferHandle) -> u64 {
        let buffers = self.buffers.lock();
        match buffers.get(&buffer) {
            Some(vulkan_buffer) if vulkan_buffer.usage.contains(BufferUsage::DEVICE_ADDRESS) => {
                let info = vk::BufferDeviceAddressInfo::default().buffer(vulkan_buffer.buffer);
                unsafe { self.device.get_buffer_device_address(&info) }
            }
            _ => {
                log::error!("Buffer {:?} has no device address", buffer);
                0
            }
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        let removed = self.buffers.lock().remove(&buffer);
        match removed {
            Some(vulkan_buffer) => self.free_buffer(vulkan_buffer),
            None => log::warn!("destroy_buffer called with unknown buffer {:?}", buffer),
        }
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<ImageHandle, GraphicsError> {
        if descriptor.extent.width == 0 || descriptor.extent.height == 0 {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "Cannot create an image of extent {:?}",
                descriptor.extent
            )));
        }

        let format = convert_image_format(descriptor.format);
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: descriptor.extent.width,
                height: descriptor.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_image_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&image_info, None) }.map_err(|e| {
            GraphicsError::ResourceCreationFailed(format!("Failed to create image: {:?}", e))
        })?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name: descriptor.label.as_deref().unwrap_or("image"),
                requirements,
                location: gpu_allocator::MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                unsafe { self.device.destroy_image(image, None) };
                GraphicsError::ResourceCreationFailed(format!(
                    "Failed to allocate image memory: {}",
                    e
                ))
            })?;

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        let vulkan_image = VulkanImage {
            image,
            allocation,
            format,
            aspect: image_aspect(descriptor.format),
        };
        if let Err(e) = bound {
            self.free_image(vulkan_image);
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "Failed to bind image memory: {:?}",
                e
            )));
        }

        let handle = ImageHandle::from_raw(image.as_raw());
        self.images.lock().insert(handle, vulkan_image);
        Ok(handle)
    }

    fn destroy_image(&self, image: ImageHandle) {
        let removed = self.images.lock().remove(&image);
        match removed {
            Some(vulkan_image) => self.free_image(vulkan_image),
            // Created outside the backend; the owner manages its memory.
            None => unsafe {
                self.device
                    .destroy_image(to_vk::<vk::Image>(image.as_raw()), None)
            },
        }
    }

    fn create_image_view(&self, image: ImageHandle) -> Result<ImageViewHandle, GraphicsError> {
        let (vk_image, format, aspect) = match self.images.lock().get(&image) {
            Some(vulkan_image) => (vulkan_image.image, vulkan_image.format, vulkan_image.aspect),
            None => {
                return Err(GraphicsError::ResourceCreationFailed(format!(
                    "create_image_view called with unknown image {:?}",
                    image
                )));
            }
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(vk_image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe { self.device.create_image_view(&view_info, None) }
            .map_err(|e| convert_result(e, "Failed to create image view"))?;
        Ok(ImageViewHandle::from_raw(view.as_raw()))
    }

    fn destroy_image_view(&self, view: ImageViewHandle) {
        unsafe {
            self.device
                .destroy_image_view(to_vk::<vk::ImageView>(view.as_raw()), None)
        };
    }

    fn destroy_sampler(&self, sampler: SamplerHandle) {
        unsafe {
            self.device
                .destroy_sampler(to_vk::<vk::Sampler>(sampler.as_raw()), None)
        };
    }

    fn destroy_pipeline(&self, pipeline: PipelineHandle) {
        unsafe {
            self.device
                .destroy_pipeline(to_vk::<vk::Pipeline>(pipeline.as_raw()), None)
        };
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        unsafe {
            self.device
                .destroy_pipeline_layout(to_vk::<vk::PipelineLayout>(layout.as_raw()), None)
        };
    }

    // === Submission and presentation ===

    fn acquire_next_image(
        &self,
        signal: SemaphoreHandle,
        timeout: Duration,
    ) -> Result<u32, GraphicsError> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_nanos(timeout),
                to_vk::<vk::Semaphore>(signal.as_raw()),
                vk::Fence::null(),
            )
        };
        match result {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::trace!("Swapchain suboptimal");
                }
                check_image_index(image_index, self.swapchain_images.len())
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(GraphicsError::Timeout {
                what: "swapchain image",
                timeout,
            }),
            Err(e) => Err(convert_result(e, "Failed to acquire swapchain image")),
        }
    }

    fn submit(&self, info: &SubmitInfo) -> Result<(), GraphicsError> {
        let command_buffers = [to_vk::<vk::CommandBuffer>(info.command_buffer.as_raw())];
        let wait_semaphores: Vec<vk::Semaphore> = info
            .wait_semaphore
            .iter()
            .map(|s| to_vk::<vk::Semaphore>(s.as_raw()))
            .collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = wait_semaphores
            .iter()
            .map(|_| vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = info
            .signal_semaphore
            .iter()
            .map(|s| to_vk::<vk::Semaphore>(s.as_raw()))
            .collect();
        let fence = info
            .fence
            .map(|f| to_vk::<vk::Fence>(f.as_raw()))
            .unwrap_or_else(vk::Fence::null);

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info], fence)
        }
        .map_err(|e| convert_result(e, "Failed to submit command buffer"))
    }

    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<(), GraphicsError> {
        let wait_semaphores = [to_vk::<vk::Semaphore>(wait.as_raw())];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.graphics_queue, &present_info)
        };

        match result {
            Ok(_) => {
                log::trace!("Presented image index {}", image_index);
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date, needs recreation");
                Ok(())
            }
            Err(e) => Err(convert_result(e, "Failed to present swapchain image")),
        }
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        unsafe { self.device.device_wait_idle() }
            .map_err(|e| convert_result(e, "Failed to wait for device idle"))
    }

    // === Commands ===

    fn cmd_transition_image(
        &self,
        command_buffer: CommandBufferHandle,
        image_index: u32,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        let Some((image, _)) = self.swapchain_image(image_index) else {
            log::error!("Transition of unknown swapchain image {}", image_index);
            return;
        };
        command::transition_image(
            &self.device,
            to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
            image,
            vk::ImageAspectFlags::COLOR,
            convert_image_layout(from),
            convert_image_layout(to),
        );
    }

    fn cmd_transition_attachment(
        &self,
        command_buffer: CommandBufferHandle,
        image: ImageHandle,
        from: ImageLayout,
        to: ImageLayout,
    ) {
        let Some((vk_image, aspect)) = self
            .images
            .lock()
            .get(&image)
            .map(|vulkan_image| (vulkan_image.image, vulkan_image.aspect))
        else {
            log::error!("Transition of unknown image {:?}", image);
            return;
        };
        command::transition_image(
            &self.device,
            to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
            vk_image,
            aspect,
            convert_image_layout(from),
            convert_image_layout(to),
        );
    }

    fn cmd_begin_rendering(&self, command_buffer: CommandBufferHandle, info: &RenderingInfo) {
        let Some((_, view)) = self.swapchain_image(info.image_index) else {
            log::error!("Rendering into unknown swapchain image {}", info.image_index);
            return;
        };
        let cmd = to_vk::<vk::CommandBuffer>(command_buffer.as_raw());

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: info.extent.width,
                height: info.extent.height,
            },
        };
        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: info.clear_color,
                },
            })];
        let depth_attachment = info.depth_view.map(|depth_view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(to_vk::<vk::ImageView>(depth_view.as_raw()))
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 0.0,
                        stencil: 0,
                    },
                })
        });
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        unsafe {
            self.dynamic_rendering
                .cmd_begin_rendering(cmd, &rendering_info);
        }

        // Y is flipped by the projection, so the viewport keeps a positive height.
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: info.extent.width as f32,
            height: info.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.device.cmd_set_viewport(cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(cmd, 0, &[render_area]);
        }
    }

    fn cmd_end_rendering(&self, command_buffer: CommandBufferHandle) {
        unsafe {
            self.dynamic_rendering
                .cmd_end_rendering(to_vk::<vk::CommandBuffer>(command_buffer.as_raw()));
        }
    }

    fn cmd_bind_pipeline(&self, command_buffer: CommandBufferHandle, pipeline: PipelineHandle) {
        unsafe {
            self.device.cmd_bind_pipeline(
                to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
                vk::PipelineBindPoint::GRAPHICS,
                to_vk::<vk::Pipeline>(pipeline.as_raw()),
            );
        }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        first_set: u32,
        sets: &[DescriptorSetHandle],
    ) {
        let vk_sets: Vec<vk::DescriptorSet> = sets
            .iter()
            .map(|set| to_vk::<vk::DescriptorSet>(set.as_raw()))
            .collect();
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
                vk::PipelineBindPoint::GRAPHICS,
                to_vk::<vk::PipelineLayout>(layout.as_raw()),
                first_set,
                &vk_sets,
                &[],
            );
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        buffer: BufferHandle,
        offset: u64,
    ) {
        unsafe {
            self.device.cmd_bind_index_buffer(
                to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
                to_vk::<vk::Buffer>(buffer.as_raw()),
                offset,
                vk::IndexType::UINT32,
            );
        }
    }

    fn cmd_push_constants(
        &self,
        command_buffer: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(
                to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
                to_vk::<vk::PipelineLayout>(layout.as_raw()),
                convert_shader_stages(stages),
                offset,
                data,
            );
        }
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: CommandBufferHandle,
        index_count: u32,
        first_index: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
                index_count,
                1,
                first_index,
                0,
                0,
            );
        }
    }

    fn cmd_copy_buffer(
        &self,
        command_buffer: CommandBufferHandle,
        src: BufferHandle,
        dst: BufferHandle,
        region: &BufferCopy,
    ) {
        let copy = vk::BufferCopy {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        };
        unsafe {
            self.device.cmd_copy_buffer(
                to_vk::<vk::CommandBuffer>(command_buffer.as_raw()),
                to_vk::<vk::Buffer>(src.as_raw()),
                to_vk::<vk::Buffer>(dst.as_raw()),
                &[copy],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_nanos_saturates() {
        assert_eq!(timeout_nanos(Duration::from_millis(1)), 1_000_000);
        assert_eq!(timeout_nanos(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_image_index_checked_against_swapchain() {
        assert_eq!(check_image_index(0, 3).unwrap(), 0);
        assert_eq!(check_image_index(2, 3).unwrap(), 2);
        assert!(matches!(
            check_image_index(3, 3),
            Err(GraphicsError::Internal(_))
        ));
        assert!(check_image_index(0, 0).is_err());
    }

    #[test]
    fn test_handles_round_trip_through_vulkan() {
        let fence = FenceHandle::from_raw(0xdead_beef);
        let vk_fence = to_vk::<vk::Fence>(fence.as_raw());
        assert_eq!(FenceHandle::from_raw(vk_fence.as_raw()), fence);
        assert!(to_vk::<vk::Fence>(FenceHandle::NULL.as_raw()).is_null());
    }
}
